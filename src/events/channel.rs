//! Simple stateless pub-sub event handler
//!
//! This module provides a small hook system that lets components subscribe to pool events and react to them. The
//! handler is stateless: all a hook receives is the event itself. Hooks can be async.
//!
//! Events are handled strictly in arrival order, one at a time. The handler loop shuts down on its own once every
//! producer has been dropped and the queue has drained, so no explicit stop signal is needed.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::sync::mpsc;

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    pub async fn start_handler(mut self) {
        debug!("📡️ Starting event handler");
        // Drop the internal sender so the loop ends once the last subscriber goes away.
        drop(self.sender);
        while let Some(ev) = self.listener.recv().await {
            trace!("📡️ Handling event");
            (self.handler)(ev).await;
            trace!("📡️ Event handled");
        }
        debug!("📡️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📡️ Failed to publish event: {e}");
        }
    }
}
