use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, PackageAssignedEvent, PackageFailedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub package_assigned_producer: Vec<EventProducer<PackageAssignedEvent>>,
    pub package_failed_producer: Vec<EventProducer<PackageFailedEvent>>,
}

pub struct EventHandlers {
    pub on_package_assigned: Option<EventHandler<PackageAssignedEvent>>,
    pub on_package_failed: Option<EventHandler<PackageFailedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_package_assigned = hooks.on_package_assigned.map(|f| EventHandler::new(buffer_size, f));
        let on_package_failed = hooks.on_package_failed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_package_assigned, on_package_failed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_package_assigned {
            result.package_assigned_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_package_failed {
            result.package_failed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_package_assigned {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_package_failed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_package_assigned: Option<Handler<PackageAssignedEvent>>,
    pub on_package_failed: Option<Handler<PackageFailedEvent>>,
}

impl EventHooks {
    pub fn on_package_assigned<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PackageAssignedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_package_assigned = Some(Arc::new(f));
        self
    }

    pub fn on_package_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PackageFailedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_package_failed = Some(Arc::new(f));
        self
    }
}
