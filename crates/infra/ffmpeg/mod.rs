pub mod ffmpeg_processor;
