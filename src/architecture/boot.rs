// The boot sequences. QEMU's `-kernel` drops the boot core here at EL1;
// secondary cores arrive at `_secondary_start` via PSCI CPU_ON with
// their control block in x0. The control block's first field is the
// initial stack pointer, and the block itself becomes the core-local
// anchor in TPIDR_EL1.
core::arch::global_asm!(
    r#"
    .section .text._start
    .global _start
    _start:
        mrs     x1, mpidr_el1
        and     x1, x1, #0xff
        cbnz    x1, 1f
        ldr     x1, =__boot_stack_end
        mov     sp, x1
        ldr     x1, =__bss_start
        ldr     x2, =__bss_end
    2:
        cmp     x1, x2
        b.eq    3f
        str     xzr, [x1], #8
        b       2b
    3:
        b       kernel_init
    1:
        wfe
        b       1b

    .section .text
    .global _secondary_start
    _secondary_start:
        ldr     x1, [x0]
        mov     sp, x1
        msr     tpidr_el1, x0
        b       smp_core_entry
    "#
);

extern "C" {
    /// The secondary-core entry point, only ever jumped to by firmware
    fn _secondary_start();
}

/// The fixed trampoline address handed to the power-on service
pub fn secondary_entry() -> usize {
    _secondary_start as usize
}
