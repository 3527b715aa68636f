// Fixed-rate cooperative scheduler
//
// The scheduler owns one subsystem (the shared resource) and runs at most one
// command against it per cycle. Commands only ever see the subsystem through
// the `&mut` the scheduler hands them, so two commands can never drive it in
// the same cycle.

use tracing::{debug, info};

/// Something with per-cycle housekeeping, e.g. the drivetrain
pub trait Subsystem {
    fn name(&self) -> &'static str;

    /// Called once per cycle before any command runs
    fn periodic(&mut self);

    /// Called after the commands when running without hardware
    fn simulation_periodic(&mut self, _dt: f64) {}
}

/// A unit of behavior that requires subsystem `S` while it runs
pub trait Command<S: Subsystem> {
    fn name(&self) -> &'static str;

    /// Called once when the command is scheduled
    fn initialize(&mut self, _subsystem: &mut S) {}

    /// Called every cycle while scheduled
    fn execute(&mut self, subsystem: &mut S);

    /// Checked after every `execute`
    fn is_finished(&self, _subsystem: &S) -> bool {
        false
    }

    /// Called once when the command stops; `interrupted` is false only when
    /// `is_finished` returned true
    fn end(&mut self, _subsystem: &mut S, _interrupted: bool) {}
}

/// Owns a subsystem, its default command, and the active command
pub struct Scheduler<S: Subsystem> {
    subsystem: S,
    default_command: Option<Box<dyn Command<S> + Send>>,
    active: Option<Box<dyn Command<S> + Send>>,
    // True while the active command is the default one
    active_is_default: bool,
}

impl<S: Subsystem> Scheduler<S> {
    pub fn new(subsystem: S) -> Self {
        Self {
            subsystem,
            default_command: None,
            active: None,
            active_is_default: false,
        }
    }

    pub fn subsystem(&self) -> &S {
        &self.subsystem
    }

    pub fn subsystem_mut(&mut self) -> &mut S {
        &mut self.subsystem
    }

    /// Command that runs whenever nothing else is scheduled
    pub fn set_default_command(&mut self, command: Box<dyn Command<S> + Send>) {
        if self.active_is_default {
            self.cancel();
        }
        info!("Default command for {}: {}", self.subsystem.name(), command.name());
        self.default_command = Some(command);
    }

    /// Start `command` now, interrupting whatever is running
    pub fn schedule(&mut self, mut command: Box<dyn Command<S> + Send>) {
        self.cancel();
        info!("Scheduling {}", command.name());
        command.initialize(&mut self.subsystem);
        self.active = Some(command);
        self.active_is_default = false;
    }

    /// Interrupt the active command, if any
    pub fn cancel(&mut self) {
        let Some(mut command) = self.active.take() else {
            return;
        };
        info!("Interrupting {}", command.name());
        command.end(&mut self.subsystem, true);
        self.park(command);
    }

    /// Name of the running command
    pub fn active_command(&self) -> Option<&'static str> {
        self.active.as_ref().map(|c| c.name())
    }

    /// Run one cycle: subsystem housekeeping, then the active command
    pub fn run_cycle(&mut self) {
        self.subsystem.periodic();

        if self.active.is_none() {
            if let Some(mut command) = self.default_command.take() {
                debug!("Starting default command {}", command.name());
                command.initialize(&mut self.subsystem);
                self.active = Some(command);
                self.active_is_default = true;
            }
        }

        let Some(command) = self.active.as_mut() else {
            return;
        };
        command.execute(&mut self.subsystem);

        if command.is_finished(&self.subsystem) {
            if let Some(mut command) = self.active.take() {
                info!("{} finished", command.name());
                command.end(&mut self.subsystem, false);
                self.park(command);
            }
        }
    }

    /// Return a stopped default command to its slot; drop anything else
    fn park(&mut self, command: Box<dyn Command<S> + Send>) {
        if self.active_is_default {
            self.default_command = Some(command);
            self.active_is_default = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Counter {
        periodic_calls: u32,
        log: Vec<String>,
    }

    impl Subsystem for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        fn periodic(&mut self) {
            self.periodic_calls += 1;
            self.log.push("periodic".to_string());
        }
    }

    struct Recorder {
        name: &'static str,
        runs: u32,
        finish_after: Option<u32>,
        ended: Arc<Mutex<Vec<(&'static str, bool)>>>,
    }

    impl Command<Counter> for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn initialize(&mut self, subsystem: &mut Counter) {
            subsystem.log.push(format!("{} init", self.name));
        }

        fn execute(&mut self, subsystem: &mut Counter) {
            self.runs += 1;
            subsystem.log.push(format!("{} exec", self.name));
        }

        fn is_finished(&self, _subsystem: &Counter) -> bool {
            self.finish_after.is_some_and(|n| self.runs >= n)
        }

        fn end(&mut self, _subsystem: &mut Counter, interrupted: bool) {
            self.ended.lock().unwrap().push((self.name, interrupted));
        }
    }

    fn recorder(
        name: &'static str,
        finish_after: Option<u32>,
        ended: &Arc<Mutex<Vec<(&'static str, bool)>>>,
    ) -> Box<Recorder> {
        Box::new(Recorder {
            name,
            runs: 0,
            finish_after,
            ended: Arc::clone(ended),
        })
    }

    #[test]
    fn test_periodic_runs_before_command() {
        let ended = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(Counter::default());
        scheduler.schedule(recorder("a", None, &ended));
        scheduler.run_cycle();
        assert_eq!(scheduler.subsystem().log, vec!["a init", "periodic", "a exec"]);
    }

    #[test]
    fn test_one_shot_finishes() {
        let ended = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(Counter::default());
        scheduler.schedule(recorder("once", Some(2), &ended));
        scheduler.run_cycle();
        assert_eq!(scheduler.active_command(), Some("once"));
        scheduler.run_cycle();
        assert_eq!(scheduler.active_command(), None);
        assert_eq!(*ended.lock().unwrap(), vec![("once", false)]);

        // Subsystem keeps ticking with nothing scheduled
        scheduler.run_cycle();
        assert_eq!(scheduler.subsystem().periodic_calls, 3);
    }

    #[test]
    fn test_default_command_resumes() {
        let ended = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(Counter::default());
        scheduler.set_default_command(recorder("teleop", None, &ended));
        scheduler.run_cycle();
        assert_eq!(scheduler.active_command(), Some("teleop"));

        scheduler.schedule(recorder("auto", Some(1), &ended));
        assert_eq!(*ended.lock().unwrap(), vec![("teleop", true)]);
        scheduler.run_cycle();
        assert_eq!(scheduler.active_command(), None);

        scheduler.run_cycle();
        assert_eq!(scheduler.active_command(), Some("teleop"));
        assert_eq!(*ended.lock().unwrap(), vec![("teleop", true), ("auto", false)]);
    }

    #[test]
    fn test_cancel_without_command() {
        let mut scheduler = Scheduler::new(Counter::default());
        scheduler.cancel();
        scheduler.run_cycle();
        assert_eq!(scheduler.subsystem().periodic_calls, 1);
    }
}
