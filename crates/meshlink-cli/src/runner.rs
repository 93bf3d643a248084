//! Control loop around a protocol stack.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meshlink_node::{Clock, NodeEvent, NodeResult, ProtocolStack, Timestamp, Transport};
use meshlink_packet::NodeAddress;
use tracing::{debug, warn};

/// How a reliable message ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Acknowledged,
    Failed,
    /// The loop was stopped before the outcome was known.
    Interrupted,
}

/// Polls a stack at a fixed interval until told to stop.
pub struct Runner<T: Transport, C: Clock> {
    stack: ProtocolStack<T, C>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    hello_interval: Option<Duration>,
    last_hello: Option<Timestamp>,
}

impl<T: Transport, C: Clock> Runner<T, C> {
    pub fn new(stack: ProtocolStack<T, C>, running: Arc<AtomicBool>, poll_interval: Duration) -> Self {
        Runner {
            stack,
            running,
            poll_interval,
            hello_interval: None,
            last_hello: None,
        }
    }

    /// Send a Hello every `interval` while polling.
    pub fn with_hello_interval(mut self, interval: Option<Duration>) -> Self {
        self.hello_interval = interval;
        self
    }

    pub fn stack(&self) -> &ProtocolStack<T, C> {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut ProtocolStack<T, C> {
        &mut self.stack
    }

    /// Broadcast a Hello now and restart the Hello timer.
    pub fn announce(&mut self) -> NodeResult<()> {
        self.stack.send_hello()?;
        self.last_hello = Some(self.stack.now());
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One cycle: periodic Hello, then a poll.
    pub fn cycle(&mut self) -> Vec<NodeEvent> {
        if let Some(interval) = self.hello_interval {
            let now = self.stack.now();
            let due = self
                .last_hello
                .map(|last| now.saturating_duration_since(last) >= interval)
                .unwrap_or(true);
            if due {
                if let Err(e) = self.announce() {
                    warn!("failed to send hello: {}", e);
                }
            }
        }

        self.stack.poll()
    }

    /// Poll until stopped, handing every event to `on_event`. Returning `false`
    /// from `on_event` ends the loop.
    pub fn run<F>(&mut self, mut on_event: F)
    where
        F: FnMut(&ProtocolStack<T, C>, &NodeEvent) -> bool,
    {
        while self.is_running() {
            for event in self.cycle() {
                if !on_event(&self.stack, &event) {
                    return;
                }
            }
            std::thread::sleep(self.poll_interval);
        }
        debug!("control loop stopped");
    }

    /// Poll until `message_id` is acknowledged or abandoned.
    pub fn wait_for_outcome<F>(&mut self, message_id: u16, mut on_event: F) -> Outcome
    where
        F: FnMut(&NodeEvent),
    {
        let mut outcome = Outcome::Interrupted;
        self.run(|_, event| {
            on_event(event);
            match event {
                NodeEvent::Acknowledged { message_id: id, .. } if *id == message_id => {
                    outcome = Outcome::Acknowledged;
                    false
                }
                NodeEvent::DeliveryFailed { message_id: id, .. } if *id == message_id => {
                    outcome = Outcome::Failed;
                    false
                }
                _ => true,
            }
        });
        outcome
    }

    /// Poll until a Hello from `address` has been received, or `timeout`
    /// passes. Returns whether the node is now reachable.
    pub fn wait_for_neighbor<F>(
        &mut self,
        address: NodeAddress,
        timeout: Duration,
        mut on_event: F,
    ) -> bool
    where
        F: FnMut(&NodeEvent),
    {
        let deadline = self.stack.now() + timeout;
        while self.is_running() && !self.stack.can_reach(address) && self.stack.now() < deadline {
            for event in self.cycle() {
                on_event(&event);
            }
            if self.stack.can_reach(address) {
                break;
            }
            std::thread::sleep(self.poll_interval);
        }
        self.stack.can_reach(address)
    }

    /// Poll for `duration`, reporting events.
    pub fn listen_for<F>(&mut self, duration: Duration, mut on_event: F)
    where
        F: FnMut(&NodeEvent),
    {
        let deadline = self.stack.now() + duration;
        while self.is_running() && self.stack.now() < deadline {
            for event in self.cycle() {
                on_event(&event);
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}
