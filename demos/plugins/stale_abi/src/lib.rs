//! Module built for a registration interface the host no longer speaks.
//!
//! The host rejects it while probing the ABI version, before looking for the
//! entry point.

#[no_mangle]
pub extern "C" fn _kiln_abi_version() -> u32 {
    0
}
