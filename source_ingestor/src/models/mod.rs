pub mod raw_item;
pub mod request_params;
