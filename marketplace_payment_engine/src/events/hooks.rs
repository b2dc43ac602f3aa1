use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, OrderPaidEvent, RefundSettledEvent, TransferFailedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub transfer_failed_producer: Vec<EventProducer<TransferFailedEvent>>,
    pub refund_settled_producer: Vec<EventProducer<RefundSettledEvent>>,
}

pub struct EventHandlers {
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
    pub on_transfer_failed: Option<EventHandler<TransferFailedEvent>>,
    pub on_refund_settled: Option<EventHandler<RefundSettledEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_paid = hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f));
        let on_transfer_failed = hooks.on_transfer_failed.map(|f| EventHandler::new(buffer_size, f));
        let on_refund_settled = hooks.on_refund_settled.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_paid, on_transfer_failed, on_refund_settled }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_transfer_failed {
            result.transfer_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_refund_settled {
            result.refund_settled_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_paid {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_transfer_failed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_refund_settled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_transfer_failed: Option<Handler<TransferFailedEvent>>,
    pub on_refund_settled: Option<Handler<RefundSettledEvent>>,
}

impl EventHooks {
    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_transfer_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TransferFailedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_transfer_failed = Some(Arc::new(f));
        self
    }

    pub fn on_refund_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RefundSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_refund_settled = Some(Arc::new(f));
        self
    }
}
