pub mod bsp_stop_storing;
pub mod bsp_submit_proof;
pub mod bsp_upload_file;
pub mod user_sends_file;
