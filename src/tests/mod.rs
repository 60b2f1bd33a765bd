mod error;
mod loopback;
