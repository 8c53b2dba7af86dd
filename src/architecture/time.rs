use core::time::Duration;

/// Time since the counter started, which for our purposes is boot
#[cfg(target_arch = "aarch64")]
pub fn now() -> Duration {
    use aarch64_cpu::registers::{CNTFRQ_EL0, CNTPCT_EL0};
    use tock_registers::interfaces::Readable;

    const NANOSEC_PER_SEC: u64 = 1_000_000_000;

    let frequency = CNTFRQ_EL0.get().max(1);
    let ticks = CNTPCT_EL0.get();
    let nanoseconds = u128::from(ticks) * u128::from(NANOSEC_PER_SEC) / u128::from(frequency);
    Duration::new(
        (nanoseconds / u128::from(NANOSEC_PER_SEC)) as u64,
        (nanoseconds % u128::from(NANOSEC_PER_SEC)) as u32,
    )
}

/// Off-target the log prefix clock just reads zero
#[cfg(not(target_arch = "aarch64"))]
pub fn now() -> Duration {
    Duration::ZERO
}
