//! Progress reporting as an observer list owned by each pipeline or supervisor.

use crate::pipeline::Step;
use serde::Serialize;
use std::sync::mpsc::{self, Receiver, Sender};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    StepStarted { step: Step },
    StepFinished { step: Step },
    StepFailed { step: Step, message: String },
    /// One human-readable progress line.
    Log { line: String },
    /// The snapshot cache reported nothing to do.
    Skipped { reason: String },
}

impl PipelineEvent {
    pub fn log(line: impl Into<String>) -> Self {
        Self::Log { line: line.into() }
    }
}

/// A subscriber to a [`Broadcast`].
pub trait LogSink: Send {
    fn on_event(&mut self, event: &PipelineEvent);
}

impl<F> LogSink for F
where
    F: FnMut(&PipelineEvent) + Send,
{
    fn on_event(&mut self, event: &PipelineEvent) {
        self(event);
    }
}

/// Delivers every event to each subscriber, in subscription order.
#[derive(Default)]
pub struct Broadcast {
    sinks: Vec<Box<dyn LogSink>>,
}

impl Broadcast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, sink: Box<dyn LogSink>) {
        self.sinks.push(sink);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn send(&mut self, event: &PipelineEvent) {
        for sink in &mut self.sinks {
            sink.on_event(event);
        }
    }
}

/// Forwards events into an mpsc channel; a dropped receiver is ignored.
pub struct ChannelSink {
    tx: Sender<PipelineEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<PipelineEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl LogSink for ChannelSink {
    fn on_event(&mut self, event: &PipelineEvent) {
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn every_subscriber_sees_every_event_in_order() {
        let mut broadcast = Broadcast::new();
        let (first, first_rx) = ChannelSink::new();
        let (second, second_rx) = ChannelSink::new();
        broadcast.subscribe(Box::new(first));
        broadcast.subscribe(Box::new(second));

        broadcast.send(&PipelineEvent::StepStarted { step: Step::Copy });
        broadcast.send(&PipelineEvent::log("copy: popup/popup.html"));

        for rx in [first_rx, second_rx] {
            let events: Vec<_> = rx.try_iter().collect();
            assert_eq!(
                events,
                vec![
                    PipelineEvent::StepStarted { step: Step::Copy },
                    PipelineEvent::log("copy: popup/popup.html"),
                ]
            );
        }
    }

    #[test]
    fn closures_are_sinks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let mut broadcast = Broadcast::new();
        broadcast.subscribe(Box::new(move |e: &PipelineEvent| {
            captured.lock().unwrap().push(e.clone());
        }));
        broadcast.send(&PipelineEvent::Skipped {
            reason: "no changes".to_owned(),
        });
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(broadcast.subscriber_count(), 1);
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let mut broadcast = Broadcast::new();
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        broadcast.subscribe(Box::new(sink));
        broadcast.send(&PipelineEvent::log("still fine"));
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(PipelineEvent::StepFinished {
            step: Step::SetupBundler,
        })
        .unwrap();
        assert_eq!(json["event"], "step_finished");
        assert_eq!(json["step"], "setup_bundler");
    }
}
