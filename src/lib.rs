pub mod http;
pub mod mac;
pub mod udp;
pub mod wol;
