use membw_types::{RunConfig, ELEMENT_BYTES};
use crate::Error;

pub(crate) fn validate(cfg: &RunConfig) -> Result<(), Error> {
    if cfg.len == 0 {
        return Err(Error::InvalidConfig("Buffer length must be non-zero".into()));
    }

    // Byte count feeds both the allocation and the bandwidth formula
    if cfg.len.checked_mul(ELEMENT_BYTES).is_none() {
        return Err(Error::InvalidConfig(format!(
            "Buffer length {} overflows the address space",
            cfg.len
        )));
    }

    if cfg.threads == 0 {
        return Err(Error::InvalidConfig("Thread count must be non-zero".into()));
    }

    if cfg.unroll_widths.is_empty() {
        return Err(Error::InvalidConfig("No unroll widths configured".into()));
    }

    Ok(())
}
