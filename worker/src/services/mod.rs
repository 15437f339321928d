pub mod publish_loop;
