pub mod controller;
pub mod kernels;
pub mod worker;
