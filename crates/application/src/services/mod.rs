mod call_relay;
mod chat_service;
mod message_router;
mod receipt_tracker;
mod user_service;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod call_relay_tests;
#[cfg(test)]
mod receipt_tracker_tests;

pub use call_relay::CallRelay;
pub use chat_service::{ChatService, ChatServiceDependencies};
pub use message_router::MessageRouter;
pub use receipt_tracker::ReceiptTracker;
pub use user_service::{
    AuthenticateUserRequest, RegisterUserRequest, UserService, UserServiceDependencies,
};
