mod message;

pub use message::{Message, MessageBody, Role, UploadedImage};
