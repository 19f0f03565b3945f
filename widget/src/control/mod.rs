//! Control: the cross-frame link between the widget and its host page.

pub mod channel;
pub mod commands;

pub use channel::{
    ChannelHostPort, ControlChannel, ControlError, Delivery, DropReason, HostPort, Listener, OriginPolicy, Subscription,
};
pub use commands::{CommandError, HostCommand};
