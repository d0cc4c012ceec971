use eyre::EyreHandler;
use std::{error::Error, fmt};

/// Report handler for `foresight` errors.
///
/// Prints the cause chain with repeated messages collapsed. A verbose handler, when set,
/// takes over `Debug` output entirely.
#[derive(Default)]
pub struct Handler {
    verbose: Option<Box<dyn EyreHandler>>,
}

impl Handler {
    pub fn new(verbose: Option<Box<dyn EyreHandler>>) -> Self {
        Self { verbose }
    }
}

impl EyreHandler for Handler {
    fn display(&self, error: &(dyn Error + 'static), f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&dedup_chain(error).join("; "))
    }

    fn debug(&self, error: &(dyn Error + 'static), f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.verbose {
            Some(verbose) => verbose.debug(error, f),
            None if f.alternate() => fmt::Debug::fmt(error, f),
            None => {
                let chain = dedup_chain(error);
                let mut messages = chain.iter();
                if let Some(top) = messages.next() {
                    write!(f, "{top}")?;
                }
                for cause in messages {
                    write!(f, "\n  caused by: {cause}")?;
                }
                Ok(())
            }
        }
    }

    fn track_caller(&mut self, location: &'static std::panic::Location<'static>) {
        if let Some(verbose) = self.verbose.as_mut() {
            verbose.track_caller(location);
        }
    }
}

/// Messages of the error and its sources, skipping sources already contained in the previous
/// message (`#[error(transparent)]` and `{0}` style wrappers repeat them).
fn dedup_chain(error: &(dyn Error + 'static)) -> Vec<String> {
    let mut messages: Vec<String> = Vec::new();
    let mut next = Some(error);
    while let Some(error) = next {
        let message = error.to_string();
        if !messages.last().is_some_and(|last| last.contains(&message)) {
            messages.push(message);
        }
        next = error.source();
    }
    messages
}

/// Sets up error reporting for `foresight`.
///
/// Wallet and backend failures are printed as one line per cause. Setting `FORESIGHT_DEBUG`
/// switches `eyre` reports to color-eyre's backtrace output, which panics always use.
pub fn install() {
    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    panic_hook.install();

    let verbose = std::env::var_os("FORESIGHT_DEBUG").is_some().then(|| eyre_hook.into_eyre_hook());
    let hook = eyre::set_hook(Box::new(move |error| {
        Box::new(Handler::new(verbose.as_ref().map(|hook| hook(error))))
    }));
    if let Err(err) = hook {
        debug!(%err, "eyre hook already installed");
    }
}
