pub mod api;
pub mod app;
pub mod email;
pub mod error;
pub mod media;
pub mod migrate;
pub mod mongo_ext;
pub mod razorpay;
pub mod util;
