use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use cangw_core::checksum::{Crc8Checksum, Crc8Profile, XorChecksum, crc8_table};
use cangw_core::frame::CanFrame;
use cangw_core::modify::{
    FrameModification, MOD_DATA, MOD_DLC, MOD_ID, ModFieldMask, ModParams, ModSlot,
};

fn sample_frame() -> CanFrame {
    CanFrame::new(0x123, &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]).unwrap()
}

fn full_slot() -> ModSlot {
    ModSlot::new(
        ModFieldMask::from_bits(MOD_ID | MOD_DLC | MOD_DATA),
        sample_frame(),
    )
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");

    let empty = FrameModification::identity();
    let full = FrameModification::from_params(ModParams {
        and: full_slot(),
        or: full_slot(),
        xor: full_slot(),
        set: full_slot(),
        ..Default::default()
    });

    for (label, m) in [("empty", &empty), ("twelve_ops", &full)] {
        group.bench_with_input(BenchmarkId::new("apply", label), m, |b, m| {
            b.iter(|| {
                let mut cf = sample_frame();
                m.apply(&mut cf);
                cf
            });
        });
    }

    group.finish();
}

fn bench_checksums(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");

    let xor = XorChecksum {
        from_idx: 0,
        to_idx: 6,
        result_idx: 7,
        init_xor_val: 0,
    };
    group.bench_function("xor_full_payload", |b| {
        b.iter(|| {
            let mut cf = sample_frame();
            xor.apply(&mut cf);
            cf
        });
    });

    let crc8 = Crc8Checksum {
        from_idx: 0,
        to_idx: 6,
        result_idx: 7,
        init_crc_val: 0xFF,
        final_xor_val: 0x00,
        crctab: crc8_table(0x1D),
        profile: Crc8Profile::XorDlc,
    };
    group.bench_function("crc8_full_payload", |b| {
        b.iter(|| {
            let mut cf = sample_frame();
            crc8.apply(&mut cf);
            cf
        });
    });

    group.finish();
}

criterion_group!(benches, bench_pipeline, bench_checksums);
criterion_main!(benches);
