mod common;
mod payment;
