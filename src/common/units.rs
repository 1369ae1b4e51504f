// Data (IEC) with base unit as bytes
pub const BYTES: u64 = 1;
pub const KIBIBYTES: u64 = 1024 * BYTES;
