use std::sync::Arc;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use redlilium_framesync::device::{BufferHandle, ImageHandle};
use redlilium_framesync::{
    BarrierBatch, BufferBarrier, DeferredReaper, DummyDevice, DummyPresentation, FramePipeliner,
    HandlerRequest, ImageAspect, ImageBarrier, ImageLayout, MemoryAccess, PipelineStage,
    PipelinerConfig, Semaphore, SharedDevice, SyncStrategy, handlers, ops,
};

fn dummy_device() -> (Arc<DummyDevice>, SharedDevice) {
    let dummy = Arc::new(DummyDevice::new());
    let device: SharedDevice = dummy.clone();
    (dummy, device)
}

// ---------------------------------------------------------------------------
// Barrier batching
// ---------------------------------------------------------------------------

fn bench_barrier_batch_images(c: &mut Criterion) {
    c.bench_function("barrier_batch_64_images", |b| {
        b.iter(|| {
            let mut batch = BarrierBatch::new();
            for i in 0..64 {
                batch.add_image_barrier(ImageBarrier {
                    image: ImageHandle::from_raw(i),
                    aspect: ImageAspect::COLOR,
                    old_layout: ImageLayout::Undefined,
                    new_layout: ImageLayout::ShaderReadOnly,
                    src_stage: PipelineStage::TRANSFER,
                    dst_stage: PipelineStage::FRAGMENT_SHADER,
                    src_access: MemoryAccess::TRANSFER_WRITE,
                    dst_access: MemoryAccess::SHADER_READ,
                });
            }
            black_box(&batch);
        });
    });
}

fn bench_barrier_batch_mixed(c: &mut Criterion) {
    c.bench_function("barrier_batch_mixed_32", |b| {
        b.iter(|| {
            let mut batch = BarrierBatch::new();
            batch.add_global_barrier(
                PipelineStage::COMPUTE_SHADER,
                PipelineStage::VERTEX_INPUT,
                Some(MemoryAccess::SHADER_WRITE),
                Some(MemoryAccess::VERTEX_ATTRIBUTE_READ),
            );
            for i in 0..16 {
                batch.add_buffer_barrier(BufferBarrier {
                    buffer: BufferHandle::from_raw(i),
                    src_stage: PipelineStage::TRANSFER,
                    dst_stage: PipelineStage::VERTEX_SHADER,
                    src_access: MemoryAccess::TRANSFER_WRITE,
                    dst_access: MemoryAccess::SHADER_READ,
                });
                // Same image twice: the second replaces the first.
                for layout in [ImageLayout::TransferDst, ImageLayout::ShaderReadOnly] {
                    batch.add_image_barrier(ImageBarrier {
                        image: ImageHandle::from_raw(i),
                        aspect: ImageAspect::COLOR,
                        old_layout: ImageLayout::Undefined,
                        new_layout: layout,
                        src_stage: PipelineStage::TOP_OF_PIPE,
                        dst_stage: PipelineStage::TRANSFER,
                        src_access: MemoryAccess::empty(),
                        dst_access: MemoryAccess::TRANSFER_WRITE,
                    });
                }
            }
            black_box((batch.src_stage_mask(), batch.dst_stage_mask()));
        });
    });
}

// ---------------------------------------------------------------------------
// Deferred release
// ---------------------------------------------------------------------------

fn bench_reaper_tag_and_reap(c: &mut Criterion) {
    let (dummy, device) = dummy_device();

    c.bench_function("reaper_tag_and_reap_64_semaphores", |b| {
        b.iter_batched(
            || {
                dummy.clear_events();
                (0..64)
                    .map(|_| Semaphore::new(&device).unwrap())
                    .collect::<Vec<_>>()
            },
            |semaphores| {
                let reaper = DeferredReaper::new(3);
                for (i, semaphore) in semaphores.into_iter().enumerate() {
                    reaper.tag(semaphore, (i / 8) as i64);
                }
                black_box(reaper.reap(8));
                black_box(reaper.flush_all());
            },
            BatchSize::SmallInput,
        );
    });
}

// ---------------------------------------------------------------------------
// Sync strategies
// ---------------------------------------------------------------------------

fn bench_auxiliary_uploads(c: &mut Criterion) {
    let (dummy, device) = dummy_device();

    c.bench_function("auxiliary_barrier_16_fills_one_submit", |b| {
        b.iter(|| {
            let mut master = SyncStrategy::with_barriers(
                drop,
                Some(handlers::default_before()),
                Some(handlers::default_after()),
            );
            for i in 0..16 {
                let aux = SyncStrategy::auxiliary_with_barriers(
                    &mut master,
                    &device,
                    HandlerRequest::StealOnDemand,
                    HandlerRequest::StealOnDemand,
                )
                .unwrap();
                ops::fill_buffer(&device, BufferHandle::from_raw(i), 0, 256, 0, aux).unwrap();
            }
            master.submit_and_sync(&device).unwrap();
            dummy.clear_events();
        });
    });
}

// ---------------------------------------------------------------------------
// Frame pipelining
// ---------------------------------------------------------------------------

fn bench_pipeliner_frame(c: &mut Criterion) {
    let (dummy, device) = dummy_device();
    let config = PipelinerConfig {
        frames_in_flight: Some(2),
        ..Default::default()
    };
    let mut pipeliner =
        FramePipeliner::new(device.clone(), DummyPresentation::new(3), config).unwrap();

    c.bench_function("pipeliner_empty_frame", |b| {
        b.iter(|| {
            black_box(pipeliner.begin_frame().unwrap());
            pipeliner.render_frame(Vec::new()).unwrap();
            dummy.clear_events();
        });
    });

    c.bench_function("pipeliner_frame_with_upload", |b| {
        b.iter(|| {
            pipeliner.begin_frame().unwrap();
            let sync = SyncStrategy::with_barriers_on_current_frame(
                pipeliner.lifetime(),
                Some(handlers::default_before()),
                Some(handlers::default_after()),
            );
            ops::fill_buffer(&device, BufferHandle::from_raw(1), 0, 1024, 0, sync).unwrap();
            pipeliner.render_frame(Vec::new()).unwrap();
            dummy.clear_events();
        });
    });
}

criterion_group!(
    barrier_benches,
    bench_barrier_batch_images,
    bench_barrier_batch_mixed,
);

criterion_group!(reaper_benches, bench_reaper_tag_and_reap);

criterion_group!(sync_benches, bench_auxiliary_uploads);

criterion_group!(pipeliner_benches, bench_pipeliner_frame);

criterion_main!(
    barrier_benches,
    reaper_benches,
    sync_benches,
    pipeliner_benches
);
