//! Handing the machine off to the platform's power-off.

use crate::command::{CommandTemplate, LaunchSpec};

#[derive(Debug, thiserror::Error)]
pub enum PowerError {
    #[error("no power-off command configured")]
    EmptyCommand,

    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with code {code:?}")]
    Failed { program: String, code: Option<i32> },
}

pub trait PowerOff {
    /// Turn the machine off. On success this normally does not return for
    /// long, since the kernel takes the process down.
    fn power_off(&mut self) -> Result<(), PowerError>;
}

/// Runs a configured command such as `sudo poweroff`.
#[derive(Debug, Clone)]
pub struct CommandPowerOff {
    launch: LaunchSpec,
}

impl CommandPowerOff {
    pub fn new(template: &CommandTemplate) -> Result<Self, PowerError> {
        let launch = template.render(&[]).ok_or(PowerError::EmptyCommand)?;
        Ok(Self { launch })
    }
}

impl PowerOff for CommandPowerOff {
    fn power_off(&mut self) -> Result<(), PowerError> {
        log::info!("Powering off: {}", self.launch);
        let status = self
            .launch
            .to_command()
            .status()
            .map_err(|source| PowerError::Spawn {
                program: self.launch.program.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(PowerError::Failed {
                program: self.launch.program.clone(),
                code: status.code(),
            })
        }
    }
}

/// Leaves the machine running; shutdown then only ends the controller.
#[derive(Debug, Default, Clone, Copy)]
pub struct StayOn;

impl PowerOff for StayOn {
    fn power_off(&mut self) -> Result<(), PowerError> {
        log::info!("Power-off disabled, exiting instead");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_rejected() {
        let template = CommandTemplate::new(Vec::<String>::new());
        assert!(matches!(
            CommandPowerOff::new(&template),
            Err(PowerError::EmptyCommand)
        ));
    }

    #[test]
    fn test_runs_command() {
        let mut power = CommandPowerOff::new(&CommandTemplate::new(["true"])).unwrap();
        power.power_off().unwrap();
    }

    #[test]
    fn test_failing_command_reports_code() {
        let mut power =
            CommandPowerOff::new(&CommandTemplate::new(["sh", "-c", "exit 4"])).unwrap();
        assert!(matches!(
            power.power_off(),
            Err(PowerError::Failed { code: Some(4), .. })
        ));
    }
}
