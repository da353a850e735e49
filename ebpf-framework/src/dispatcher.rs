use std::collections::HashMap;

use ebpf_common::CC_ENCRYPTED_CHANNEL_TRIGGER_V1;
use log::{info, warn};

use crate::{ActionError, DispatchError, EventKind, EventRecord};

/// Something to run when a known command code arrives.
pub trait CommandAction {
    fn execute(&self, event: &EventRecord) -> Result<(), ActionError>;
}

impl<F> CommandAction for F
where
    F: Fn(&EventRecord) -> Result<(), ActionError>,
{
    fn execute(&self, event: &EventRecord) -> Result<(), ActionError> {
        self(event)
    }
}

/// Action bound to [`CC_ENCRYPTED_CHANNEL_TRIGGER_V1`].
///
/// Only announces the request; the channel itself is set up elsewhere.
#[derive(Debug, Default)]
pub struct EncryptedChannelTrigger;

impl CommandAction for EncryptedChannelTrigger {
    fn execute(&self, event: &EventRecord) -> Result<(), ActionError> {
        info!("Starting encrypted connection (requested by pid {})", event.pid);
        Ok(())
    }
}

/// Command code -> action table.
#[derive(Default)]
pub struct CommandRegistry {
    actions: HashMap<i32, Box<dyn CommandAction>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in command set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(CC_ENCRYPTED_CHANNEL_TRIGGER_V1, EncryptedChannelTrigger);
        registry
    }

    /// Bind `action` to `code`, returning the action it replaced.
    pub fn register<A>(&mut self, code: i32, action: A) -> Option<Box<dyn CommandAction>>
    where
        A: CommandAction + 'static,
    {
        self.actions.insert(code, Box::new(action))
    }

    pub fn get(&self, code: i32) -> Option<&dyn CommandAction> {
        self.actions.get(&code).map(|a| a.as_ref())
    }

    pub fn contains(&self, code: i32) -> bool {
        self.actions.contains_key(&code)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut codes: Vec<_> = self.actions.keys().collect();
        codes.sort();
        f.debug_struct("CommandRegistry").field("codes", &codes).finish()
    }
}

/// What a successful dispatch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Logged,
    /// Debug record dropped because verbose output is off.
    Suppressed,
    CommandExecuted(i32),
    UnknownCommand(i32),
}

/// Routes decoded records by kind and, for commands, by code.
#[derive(Debug)]
pub struct Dispatcher {
    commands: CommandRegistry,
    verbose: bool,
}

impl Dispatcher {
    pub fn new(commands: CommandRegistry, verbose: bool) -> Self {
        Self { commands, verbose }
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn dispatch(&self, event: &EventRecord) -> Result<Dispatched, DispatchError> {
        match event.kind {
            EventKind::Info => {
                info!("INFO  {}", event);
                Ok(Dispatched::Logged)
            }
            EventKind::Debug if self.verbose => {
                info!("DEBUG {}", event);
                Ok(Dispatched::Logged)
            }
            EventKind::Debug => Ok(Dispatched::Suppressed),
            EventKind::Error => {
                warn!("ERROR {}", event);
                Ok(Dispatched::Logged)
            }
            EventKind::Exit => {
                info!("EXIT  {}", event);
                Ok(Dispatched::Logged)
            }
            EventKind::Command => self.run_command(event),
            EventKind::Data(raw) => {
                warn!("UNKNOWN({}) {}", raw, event);
                Err(DispatchError::Unhandled {
                    event_type: raw,
                    pid: event.pid,
                })
            }
        }
    }

    fn run_command(&self, event: &EventRecord) -> Result<Dispatched, DispatchError> {
        info!("COMMAND  pid:{} code:{}", event.pid, event.code);
        match self.commands.get(event.code) {
            Some(action) => {
                action
                    .execute(event)
                    .map_err(|source| DispatchError::Action {
                        code: event.code,
                        source,
                    })?;
                Ok(Dispatched::CommandExecuted(event.code))
            }
            None => {
                warn!("Command received unknown: {}", event.code);
                Ok(Dispatched::UnknownCommand(event.code))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Once};

    use log::{LevelFilter, Log, Metadata, Record};

    thread_local! {
        static LINES: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    /// Collects log lines per test thread.
    struct Capture;

    impl Log for Capture {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            let line = format!("{} {}", record.level(), record.args());
            LINES.with(|lines| lines.borrow_mut().push(line));
        }

        fn flush(&self) {}
    }

    static CAPTURE: Capture = Capture;
    static INIT: Once = Once::new();

    fn capture_logs() {
        INIT.call_once(|| {
            log::set_logger(&CAPTURE).unwrap();
            log::set_max_level(LevelFilter::Trace);
        });
        LINES.with(|lines| lines.borrow_mut().clear());
    }

    fn logged() -> Vec<String> {
        LINES.with(|lines| lines.borrow().clone())
    }

    fn record(kind: EventKind, pid: u32, code: i32) -> EventRecord {
        EventRecord {
            kind,
            pid,
            code,
            message: String::new(),
        }
    }

    fn counting(code: i32) -> (CommandRegistry, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let mut registry = CommandRegistry::new();
        registry.register(code, move |event: &EventRecord| -> Result<(), ActionError> {
            assert_eq!(event.pid, 42);
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (registry, hits)
    }

    #[test]
    fn known_command_runs_once() {
        capture_logs();
        let (registry, hits) = counting(CC_ENCRYPTED_CHANNEL_TRIGGER_V1);
        let dispatcher = Dispatcher::new(registry, false);

        let out = dispatcher
            .dispatch(&record(EventKind::Command, 42, CC_ENCRYPTED_CHANNEL_TRIGGER_V1))
            .unwrap();
        assert_eq!(out, Dispatched::CommandExecuted(CC_ENCRYPTED_CHANNEL_TRIGGER_V1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(logged().contains(&format!(
            "INFO COMMAND  pid:42 code:{}",
            CC_ENCRYPTED_CHANNEL_TRIGGER_V1
        )));
    }

    #[test]
    fn unknown_command_runs_nothing() {
        capture_logs();
        let (registry, hits) = counting(CC_ENCRYPTED_CHANNEL_TRIGGER_V1);
        let dispatcher = Dispatcher::new(registry, false);

        let out = dispatcher.dispatch(&record(EventKind::Command, 42, 999)).unwrap();
        assert_eq!(out, Dispatched::UnknownCommand(999));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(
            logged(),
            ["INFO COMMAND  pid:42 code:999", "WARN Command received unknown: 999"]
        );
    }

    #[test]
    fn non_command_records_never_run_actions() {
        let (registry, hits) = counting(CC_ENCRYPTED_CHANNEL_TRIGGER_V1);
        let dispatcher = Dispatcher::new(registry, true);

        for kind in [EventKind::Info, EventKind::Debug, EventKind::Error, EventKind::Exit] {
            let out = dispatcher
                .dispatch(&record(kind, 42, CC_ENCRYPTED_CHANNEL_TRIGGER_V1))
                .unwrap();
            assert_eq!(out, Dispatched::Logged);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn debug_is_suppressed_unless_verbose() {
        capture_logs();
        let quiet = Dispatcher::new(CommandRegistry::new(), false);
        assert_eq!(
            quiet.dispatch(&record(EventKind::Debug, 1, 0)).unwrap(),
            Dispatched::Suppressed
        );
        assert!(logged().is_empty());

        let verbose = Dispatcher::new(CommandRegistry::new(), true);
        verbose.dispatch(&record(EventKind::Debug, 1, 0)).unwrap();
        assert_eq!(logged(), ["INFO DEBUG pid:1 code:0"]);
    }

    #[test]
    fn default_trigger_announces_the_channel() {
        capture_logs();
        let dispatcher = Dispatcher::new(CommandRegistry::with_defaults(), false);
        dispatcher
            .dispatch(&record(EventKind::Command, 42, CC_ENCRYPTED_CHANNEL_TRIGGER_V1))
            .unwrap();
        assert!(logged().iter().any(|l| l.contains("Starting encrypted connection")));
    }

    #[test]
    fn unrecognised_type_is_reported_not_fatal() {
        let dispatcher = Dispatcher::new(CommandRegistry::with_defaults(), false);
        let err = dispatcher.dispatch(&record(EventKind::Data(9), 5, 1)).unwrap_err();
        assert!(matches!(err, DispatchError::Unhandled { event_type: 9, pid: 5 }));
    }

    #[test]
    fn failing_action_surfaces_its_code() {
        let mut registry = CommandRegistry::new();
        registry.register(7, |_: &EventRecord| -> Result<(), ActionError> {
            Err(ActionError("boom".into()))
        });
        let dispatcher = Dispatcher::new(registry, false);

        let err = dispatcher.dispatch(&record(EventKind::Command, 1, 7)).unwrap_err();
        assert!(matches!(err, DispatchError::Action { code: 7, .. }));
    }

    #[test]
    fn defaults_bind_the_channel_trigger() {
        let registry = CommandRegistry::with_defaults();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(CC_ENCRYPTED_CHANNEL_TRIGGER_V1));

        let mut registry = registry;
        assert!(registry
            .register(CC_ENCRYPTED_CHANNEL_TRIGGER_V1, EncryptedChannelTrigger)
            .is_some());
    }
}
