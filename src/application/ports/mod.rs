pub mod billing_gateway;
pub mod subscription_events;
pub mod subscription_store;
