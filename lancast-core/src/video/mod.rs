//! The video channel: sending, reassembly, and the display hand-off.

pub mod assembler;
pub mod display;
pub mod receiver;
pub mod sender;

pub use assembler::{AssemblerEvent, CompletedFrame, DropReason, FrameAssembler, StreamState};
pub use display::{
    DisplayFrame, FrameDecoder, FramePublisher, FrameSubscriber, Presenter, RgbImage,
    RgbImageDecoder, display_channel, run_presenter,
};
pub use receiver::{FrameReceiver, FrameStats};
pub use sender::{FrameSender, FrameSenderConfig, SenderStats};
