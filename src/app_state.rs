use crate::{fan_out::FanOutDispatcher, subscriber_store::SubscriberStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<FanOutDispatcher>,
    pub store: Arc<dyn SubscriberStore>,
}
