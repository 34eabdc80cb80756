pub mod subscription_event;
pub mod subscription_record;
pub mod subscription_status;
