pub mod source;
pub mod streamer;
