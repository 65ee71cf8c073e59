mod block_access;

pub use block_access::BlockAccess;
