//! Subscriber registry for stream events.
//!
//! Listeners are registered explicitly and called in registration order.
//! Everything runs on the client's single task, so listeners are shared as
//! `Rc<RefCell<_>>` rather than behind a lock.

use std::cell::RefCell;
use std::rc::Rc;
use tokio::sync::mpsc;

/// Handle returned by `subscribe`, used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Lets a listener act on the client from inside a callback.
#[derive(Debug, Default)]
pub struct DispatchControl {
    disconnect_requested: bool,
}

impl DispatchControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the client to disconnect once the current frame has reached every listener.
    pub fn request_disconnect(&mut self) {
        self.disconnect_requested = true;
    }

    pub fn disconnect_requested(&self) -> bool {
        self.disconnect_requested
    }
}

/// Receives frames and disconnect notifications from the client.
pub trait StreamListener {
    /// Called once per complete, non-empty frame.
    fn on_message(&mut self, raw: &str, control: &mut DispatchControl);

    /// Called exactly once per transition into the disconnected state.
    fn on_disconnected(&mut self) {}
}

/// Stream event, as forwarded by [`ChannelListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Message(String),
    Disconnected,
}

/// Forwards events into an unbounded tokio channel.
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<StreamEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl StreamListener for ChannelListener {
    fn on_message(&mut self, raw: &str, _control: &mut DispatchControl) {
        if self.sender.send(StreamEvent::Message(raw.to_string())).is_err() {
            log::debug!("Channel listener receiver dropped");
        }
    }

    fn on_disconnected(&mut self) {
        if self.sender.send(StreamEvent::Disconnected).is_err() {
            log::debug!("Channel listener receiver dropped before disconnect");
        }
    }
}

/// Ordered set of registered listeners.
#[derive(Default)]
pub struct Subscribers {
    next_id: u64,
    listeners: Vec<(ListenerId, Rc<RefCell<dyn StreamListener>>)>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. The caller keeps its own handle to inspect it.
    pub fn subscribe<L: StreamListener + 'static>(&mut self, listener: Rc<RefCell<L>>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        let listener: Rc<RefCell<dyn StreamListener>> = listener;
        self.listeners.push((id, listener));
        id
    }

    /// Deregister a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver one frame to every listener in registration order.
    pub fn emit_message(&self, raw: &str) -> DispatchControl {
        let mut control = DispatchControl::new();
        for (id, listener) in &self.listeners {
            match listener.try_borrow_mut() {
                Ok(mut l) => l.on_message(raw, &mut control),
                Err(_) => log::warn!("Listener {:?} is busy, skipping message", id),
            }
        }
        control
    }

    /// Deliver the disconnect notification to every listener.
    pub fn emit_disconnected(&self) {
        for (id, listener) in &self.listeners {
            match listener.try_borrow_mut() {
                Ok(mut l) => l.on_disconnected(),
                Err(_) => log::warn!("Listener {:?} is busy, skipping disconnect", id),
            }
        }
    }
}
