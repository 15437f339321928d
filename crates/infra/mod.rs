pub mod crypto;
pub mod db;
pub mod ffmpeg;
pub mod storage;
