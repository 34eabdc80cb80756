pub mod subscription_lifecycle;
