//! Application event dispatch.
//!
//! Handlers run synchronously on the calling thread in registration order.
//! A failing (or panicking) handler never stops the remaining ones; failures
//! are collected and returned as one [`DispatchError`].

use crate::domain::error::{ConfigurationError, DispatchError, HandlerFailure};
use crate::domain::models::{EventChannel, SecurityMode};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

pub type ShowPassKeyHandler = Box<dyn FnMut(&str) -> anyhow::Result<()> + Send>;
pub type AuthenticationCompleteHandler = Box<dyn FnMut(bool) -> anyhow::Result<()> + Send>;

pub struct EventDispatcher {
    security_mode: SecurityMode,
    show_pass_key: Vec<ShowPassKeyHandler>,
    authentication_complete: Vec<AuthenticationCompleteHandler>,
}

impl EventDispatcher {
    pub fn new(security_mode: SecurityMode) -> Self {
        Self {
            security_mode,
            show_pass_key: Vec::new(),
            authentication_complete: Vec::new(),
        }
    }

    pub fn on_show_pass_key<F>(&mut self, handler: F) -> Result<(), ConfigurationError>
    where
        F: FnMut(&str) -> anyhow::Result<()> + Send + 'static,
    {
        self.guard(EventChannel::ShowPassKey)?;
        self.show_pass_key.push(Box::new(handler));
        Ok(())
    }

    pub fn on_authentication_complete<F>(&mut self, handler: F) -> Result<(), ConfigurationError>
    where
        F: FnMut(bool) -> anyhow::Result<()> + Send + 'static,
    {
        self.guard(EventChannel::AuthenticationComplete)?;
        self.authentication_complete.push(Box::new(handler));
        Ok(())
    }

    pub fn emit_show_pass_key(&mut self, pass_key: &str) -> Result<(), DispatchError> {
        let failures = run_all(&mut self.show_pass_key, |handler| handler(pass_key));
        report(EventChannel::ShowPassKey, self.show_pass_key.len(), failures)
    }

    pub fn emit_authentication_complete(&mut self, success: bool) -> Result<(), DispatchError> {
        let failures = run_all(&mut self.authentication_complete, |handler| {
            handler(success)
        });
        report(
            EventChannel::AuthenticationComplete,
            self.authentication_complete.len(),
            failures,
        )
    }

    pub fn handler_count(&self, channel: EventChannel) -> usize {
        match channel {
            EventChannel::ShowPassKey => self.show_pass_key.len(),
            EventChannel::AuthenticationComplete => self.authentication_complete.len(),
        }
    }

    fn guard(&self, channel: EventChannel) -> Result<(), ConfigurationError> {
        if self.security_mode.authentication_enabled() {
            Ok(())
        } else {
            Err(ConfigurationError::SecurityDisabledButTriggerRequested(
                channel,
            ))
        }
    }
}

fn run_all<H>(
    handlers: &mut [H],
    mut call: impl FnMut(&mut H) -> anyhow::Result<()>,
) -> Vec<HandlerFailure> {
    let mut failures = Vec::new();
    for (index, handler) in handlers.iter_mut().enumerate() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| call(handler)));
        let message = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => format!("{:#}", e),
            Err(payload) => format!("handler panicked: {}", panic_message(&*payload)),
        };
        failures.push(HandlerFailure { index, message });
    }
    failures
}

fn report(
    channel: EventChannel,
    total: usize,
    failures: Vec<HandlerFailure>,
) -> Result<(), DispatchError> {
    if failures.is_empty() {
        return Ok(());
    }
    for failure in &failures {
        warn!(
            "{} handler #{} failed: {}",
            channel, failure.index, failure.message
        );
    }
    Err(DispatchError {
        channel,
        total,
        failures,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn handlers_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new(SecurityMode::ShowPassKey);
        for tag in ["first", "second"] {
            let seen = seen.clone();
            dispatcher
                .on_show_pass_key(move |key| {
                    seen.lock().unwrap().push(format!("{}:{}", tag, key));
                    Ok(())
                })
                .unwrap();
        }

        dispatcher.emit_show_pass_key("000042").unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            ["first:000042".to_string(), "second:000042".to_string()]
        );
    }

    #[test]
    fn failures_are_aggregated_and_do_not_stop_dispatch() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new(SecurityMode::ShowPassKey);

        dispatcher
            .on_authentication_complete(|_| anyhow::bail!("display offline"))
            .unwrap();
        dispatcher
            .on_authentication_complete(|_| panic!("boom"))
            .unwrap();
        let c = calls.clone();
        dispatcher
            .on_authentication_complete(move |ok| {
                c.lock().unwrap().push(ok);
                Ok(())
            })
            .unwrap();

        let err = dispatcher.emit_authentication_complete(true).unwrap_err();
        assert_eq!(err.channel, EventChannel::AuthenticationComplete);
        assert_eq!(err.total, 3);
        assert_eq!(err.failures.len(), 2);
        assert_eq!(err.failures[0].index, 0);
        assert!(err.failures[0].message.contains("display offline"));
        assert_eq!(err.failures[1].index, 1);
        assert!(err.failures[1].message.contains("boom"));
        assert_eq!(*calls.lock().unwrap(), [true]);
    }

    #[test]
    fn registration_requires_security() {
        let mut dispatcher = EventDispatcher::new(SecurityMode::None);
        assert_eq!(
            dispatcher.on_show_pass_key(|_| Ok(())),
            Err(ConfigurationError::SecurityDisabledButTriggerRequested(
                EventChannel::ShowPassKey
            ))
        );
        assert_eq!(
            dispatcher.on_authentication_complete(|_| Ok(())),
            Err(ConfigurationError::SecurityDisabledButTriggerRequested(
                EventChannel::AuthenticationComplete
            ))
        );
        assert_eq!(dispatcher.handler_count(EventChannel::ShowPassKey), 0);
    }

    #[test]
    fn emitting_without_handlers_is_ok() {
        let mut dispatcher = EventDispatcher::new(SecurityMode::ShowPassKey);
        assert!(dispatcher.emit_show_pass_key("123456").is_ok());
        assert!(dispatcher.emit_authentication_complete(false).is_ok());
    }
}
