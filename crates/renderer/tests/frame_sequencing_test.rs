//! Integration tests for the frame sequencer against a scripted backend.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use ash::vk;

use framepace_renderer::{
    AcquireOutcome, CreationStage, FrameBackend, FrameError, FrameSequencer, PresentOutcome,
    SubmitPlan, TickOutcome, TickPhase,
};
use framepace_rhi::swapchain::{choose_extent, determine_image_count};
use framepace_rhi::{RhiError, RhiResult};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    WaitSlot { slot: usize, was_pending: bool },
    ResetSlot(usize),
    Acquire { semaphore: usize },
    Record { slot: usize, image_index: u32, extent: vk::Extent2D, generation: u64 },
    Submit(SubmitPlan),
    Present { image_index: u32, wait_semaphore: usize },
    Rebuild(vk::Extent2D),
    WaitIdle,
    Release(CreationStage),
}

type Log = Rc<RefCell<Vec<Event>>>;

/// Simulates a device and presentation engine.
///
/// Every submission stays pending until a wait on its slot's fence, a
/// rebuild or an idle wait completes it.
struct ScriptedBackend {
    log: Log,
    capabilities: vk::SurfaceCapabilitiesKHR,
    extent: vk::Extent2D,
    image_count: u32,
    generation: u64,
    /// Size the surface actually has; acquisition is stale while it differs.
    surface_size: Option<vk::Extent2D>,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    next_image: u32,
    /// Slot of each outstanding submission, one entry per submit.
    pending: Vec<usize>,
    max_pending: usize,
    wait_failure: Option<vk::Result>,
    idle_failure: Option<vk::Result>,
}

impl ScriptedBackend {
    fn new(log: Log, width: u32, height: u32) -> Self {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 320,
                height: 320,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };
        Self {
            log,
            extent: choose_extent(&capabilities, width, height),
            image_count: determine_image_count(&capabilities),
            capabilities,
            generation: 0,
            surface_size: None,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            next_image: 0,
            pending: Vec::new(),
            max_pending: 0,
            wait_failure: None,
            idle_failure: None,
        }
    }

    fn push(&self, event: Event) {
        self.log.borrow_mut().push(event);
    }

    /// Resizes the surface behind the sequencer's back, like a compositor
    /// that reports the new size only through the swapchain.
    fn resize_surface(&mut self, width: u32, height: u32) {
        let size = vk::Extent2D { width, height };
        self.capabilities.current_extent = size;
        self.surface_size = Some(size);
    }
}

impl FrameBackend for ScriptedBackend {
    fn image_count(&self) -> u32 {
        self.image_count
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        if let Some(err) = self.wait_failure {
            return Err(RhiError::VulkanError(err));
        }
        let was_pending = self.pending.contains(&slot);
        self.pending.retain(|&pending| pending != slot);
        self.push(Event::WaitSlot { slot, was_pending });
        Ok(())
    }

    fn reset_slot(&mut self, slot: usize) -> RhiResult<()> {
        assert!(!self.pending.contains(&slot), "reset a fence still in flight");
        self.push(Event::ResetSlot(slot));
        Ok(())
    }

    fn acquire_image(&mut self, semaphore: usize) -> RhiResult<AcquireOutcome> {
        self.push(Event::Acquire { semaphore });

        if let Some(size) = self.surface_size
            && size != self.extent
        {
            return Ok(AcquireOutcome::OutOfDate);
        }
        if let Some(outcome) = self.acquire_script.pop_front() {
            return Ok(outcome);
        }

        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn record(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        self.push(Event::Record {
            slot,
            image_index,
            extent: self.extent,
            generation: self.generation,
        });
        Ok(())
    }

    fn submit(&mut self, plan: &SubmitPlan) -> RhiResult<()> {
        self.pending.push(plan.slot);
        self.max_pending = self.max_pending.max(self.pending.len());
        self.push(Event::Submit(*plan));
        Ok(())
    }

    fn present(&mut self, image_index: u32, wait_semaphore: usize) -> RhiResult<PresentOutcome> {
        self.push(Event::Present {
            image_index,
            wait_semaphore,
        });
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Presented))
    }

    fn surface_extent(&mut self, requested: vk::Extent2D) -> RhiResult<vk::Extent2D> {
        Ok(choose_extent(
            &self.capabilities,
            requested.width,
            requested.height,
        ))
    }

    fn rebuild(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        assert!(extent.width > 0 && extent.height > 0, "rebuilt with zero extent");
        self.push(Event::Rebuild(extent));
        self.pending.clear();
        self.extent = choose_extent(&self.capabilities, extent.width, extent.height);
        self.image_count = determine_image_count(&self.capabilities);
        self.next_image = 0;
        self.generation += 1;
        Ok(())
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.push(Event::WaitIdle);
        self.pending.clear();
        match self.idle_failure {
            Some(err) => Err(RhiError::VulkanError(err)),
            None => Ok(()),
        }
    }

    fn release(&mut self, stage: CreationStage) {
        assert!(self.pending.is_empty(), "released {stage} with work in flight");
        self.push(Event::Release(stage));
    }
}

fn sequencer(width: u32, height: u32, frames_in_flight: usize) -> (FrameSequencer<ScriptedBackend>, Log) {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let backend = ScriptedBackend::new(log.clone(), width, height);
    (FrameSequencer::new(backend, frames_in_flight), log)
}

fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

fn submits(log: &Log) -> Vec<SubmitPlan> {
    log.borrow()
        .iter()
        .filter_map(|e| match e {
            Event::Submit(plan) => Some(*plan),
            _ => None,
        })
        .collect()
}

#[test]
fn test_steady_state_bounds_frames_in_flight() {
    let (mut seq, _log) = sequencer(800, 600, 2);

    for _ in 0..10 {
        assert!(matches!(seq.tick().unwrap(), TickOutcome::Presented { .. }));
    }

    assert_eq!(seq.backend().max_pending, 2);
    assert_eq!(seq.frames_submitted(), 10);
    assert_eq!(seq.phase(), TickPhase::Idle);
}

#[test]
fn test_third_tick_waits_on_first_ticks_slot() {
    let (mut seq, log) = sequencer(800, 600, 2);

    let outcomes: Vec<_> = (0..3).map(|_| seq.tick().unwrap()).collect();
    let slots: Vec<_> = outcomes
        .iter()
        .map(|o| match o {
            TickOutcome::Presented { slot, .. } => *slot,
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(slots, vec![0, 1, 0]);

    let waits: Vec<_> = log
        .borrow()
        .iter()
        .filter_map(|e| match e {
            Event::WaitSlot { slot, was_pending } => Some((*slot, *was_pending)),
            _ => None,
        })
        .collect();
    // Tick 3 blocks on the work tick 1 submitted to slot 0
    assert_eq!(waits, vec![(0, false), (1, false), (0, true)]);
}

#[test]
fn test_render_finished_follows_acquired_image() {
    let (mut seq, log) = sequencer(800, 600, 2);
    assert_eq!(seq.backend().image_count, 3);
    seq.backend_mut().acquire_script = [2, 0, 1, 1, 2]
        .into_iter()
        .map(|image_index| AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
        .collect();

    for _ in 0..5 {
        seq.tick().unwrap();
    }

    let plans = submits(&log);
    assert_eq!(plans.len(), 5);
    for plan in &plans {
        assert_eq!(plan.wait_semaphore, plan.slot);
        assert_eq!(plan.signal_semaphore, plan.image_index as usize);
        assert_eq!(plan.wait_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
    }
    // Slot and image diverge on the first tick
    assert_eq!((plans[0].slot, plans[0].image_index), (0, 2));

    let presents: Vec<_> = log
        .borrow()
        .iter()
        .filter_map(|e| match e {
            Event::Present {
                image_index,
                wait_semaphore,
            } => Some((*image_index, *wait_semaphore)),
            _ => None,
        })
        .collect();
    for (image_index, wait_semaphore) in presents {
        assert_eq!(wait_semaphore, image_index as usize);
    }
}

#[test]
fn test_acquire_uses_slot_semaphore() {
    let (mut seq, log) = sequencer(800, 600, 2);
    for _ in 0..4 {
        seq.tick().unwrap();
    }
    let semaphores: Vec<_> = log
        .borrow()
        .iter()
        .filter_map(|e| match e {
            Event::Acquire { semaphore } => Some(*semaphore),
            _ => None,
        })
        .collect();
    assert_eq!(semaphores, vec![0, 1, 0, 1]);
}

#[test]
fn test_fence_reset_follows_acquire() {
    let (mut seq, log) = sequencer(800, 600, 2);
    seq.tick().unwrap();

    let events = log.borrow();
    let acquire = events
        .iter()
        .position(|e| matches!(e, Event::Acquire { .. }))
        .unwrap();
    let reset = events
        .iter()
        .position(|e| matches!(e, Event::ResetSlot(_)))
        .unwrap();
    let record = events
        .iter()
        .position(|e| matches!(e, Event::Record { .. }))
        .unwrap();
    assert!(acquire < reset && reset < record);
}

#[test]
fn test_resize_rebuilds_with_clamped_extent() {
    let (mut seq, log) = sequencer(800, 600, 2);
    seq.tick().unwrap();

    seq.request_resize(extent(400, 300));
    assert!(seq.needs_rebuild());

    for _ in 0..3 {
        assert!(matches!(seq.tick().unwrap(), TickOutcome::Presented { .. }));
    }

    let events = log.borrow();
    let rebuilds: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, Event::Rebuild(_)))
        .collect();
    // Height clamped up to the surface minimum of 320
    assert_eq!(rebuilds, vec![&Event::Rebuild(extent(400, 320))]);

    let records: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::Record {
                extent, generation, ..
            } => Some((*extent, *generation)),
            _ => None,
        })
        .collect();
    assert_eq!(records[0], (extent(800, 600), 0));
    for record in &records[1..] {
        assert_eq!(*record, (extent(400, 320), 1));
    }
    assert_eq!(seq.rebuilds(), 1);
    assert!(!seq.needs_rebuild());
}

#[test]
fn test_stale_acquire_rebuilds_and_retries() {
    let (mut seq, log) = sequencer(800, 600, 2);
    seq.tick().unwrap();

    seq.backend_mut().resize_surface(400, 300);
    let outcome = seq.tick().unwrap();
    assert!(matches!(outcome, TickOutcome::Presented { .. }));

    let events = log.borrow();
    let tail: Vec<_> = events
        .iter()
        .skip_while(|e| !matches!(e, Event::Rebuild(_)))
        .collect();
    assert!(matches!(tail[0], Event::Rebuild(_)));
    assert!(matches!(tail[1], Event::Acquire { .. }));
    assert!(matches!(
        tail[3],
        Event::Record { extent: e, generation: 1, .. } if *e == extent(400, 300)
    ));
    assert!(!seq.needs_rebuild());
}

#[test]
fn test_stale_twice_skips_tick() {
    let (mut seq, log) = sequencer(800, 600, 2);
    seq.backend_mut().acquire_script =
        VecDeque::from([AcquireOutcome::OutOfDate, AcquireOutcome::OutOfDate]);

    assert_eq!(seq.tick().unwrap(), TickOutcome::Skipped);
    assert!(seq.needs_rebuild());
    assert_eq!(seq.ring().current(), 0);
    assert!(
        !log.borrow()
            .iter()
            .any(|e| matches!(e, Event::ResetSlot(_) | Event::Submit(_)))
    );

    // Next tick rebuilds first and reuses slot 0
    assert_eq!(
        seq.tick().unwrap(),
        TickOutcome::Presented {
            slot: 0,
            image_index: 0
        }
    );
    assert_eq!(seq.rebuilds(), 2);
}

#[test]
fn test_timeout_skips_without_resetting_fence() {
    let (mut seq, log) = sequencer(800, 600, 2);
    seq.backend_mut().acquire_script = VecDeque::from([AcquireOutcome::Timeout]);

    assert_eq!(seq.tick().unwrap(), TickOutcome::Skipped);
    assert!(!log.borrow().iter().any(|e| matches!(e, Event::ResetSlot(_))));
    assert_eq!(seq.frames_submitted(), 0);

    assert!(matches!(
        seq.tick().unwrap(),
        TickOutcome::Presented { slot: 0, .. }
    ));
}

#[test]
fn test_suboptimal_acquire_presents_then_rebuilds() {
    let (mut seq, log) = sequencer(800, 600, 2);
    seq.backend_mut().acquire_script = VecDeque::from([AcquireOutcome::Acquired {
        image_index: 1,
        suboptimal: true,
    }]);

    assert_eq!(
        seq.tick().unwrap(),
        TickOutcome::Presented {
            slot: 0,
            image_index: 1
        }
    );
    assert!(seq.needs_rebuild());

    seq.tick().unwrap();
    let events = log.borrow();
    let second_tick: Vec<_> = events
        .iter()
        .skip_while(|e| !matches!(e, Event::Present { .. }))
        .skip(1)
        .collect();
    assert!(matches!(second_tick[0], Event::Rebuild(_)));
}

#[test]
fn test_stale_present_defers_rebuild() {
    let (mut seq, log) = sequencer(800, 600, 2);
    seq.backend_mut().present_script = VecDeque::from([PresentOutcome::OutOfDate]);

    assert!(matches!(seq.tick().unwrap(), TickOutcome::Presented { .. }));
    assert!(seq.needs_rebuild());
    assert_eq!(seq.ring().current(), 1);
    assert!(!log.borrow().iter().any(|e| matches!(e, Event::Rebuild(_))));

    seq.tick().unwrap();
    assert_eq!(seq.rebuilds(), 1);
}

#[test]
fn test_out_of_range_image_is_fatal() {
    let (mut seq, log) = sequencer(800, 600, 2);
    seq.backend_mut().acquire_script = VecDeque::from([AcquireOutcome::Acquired {
        image_index: 5,
        suboptimal: false,
    }]);

    match seq.tick() {
        Err(FrameError::ImageIndexOutOfRange {
            image_index,
            image_count,
        }) => {
            assert_eq!(image_index, 5);
            assert_eq!(image_count, 3);
        }
        other => panic!("expected out-of-range error, got {:?}", other),
    }
    assert!(!log.borrow().iter().any(|e| matches!(e, Event::ResetSlot(_))));
}

#[test]
fn test_fence_wait_failure_is_fatal() {
    let (mut seq, _log) = sequencer(800, 600, 2);
    seq.backend_mut().wait_failure = Some(vk::Result::ERROR_DEVICE_LOST);

    let err = seq.tick().unwrap_err();
    assert!(matches!(
        err,
        FrameError::Device {
            phase: TickPhase::WaitSlot,
            ..
        }
    ));
    assert!(err.is_device_lost());
    assert_eq!(seq.phase(), TickPhase::WaitSlot);
}

#[test]
fn test_minimized_window_suspends() {
    let (mut seq, log) = sequencer(800, 600, 2);
    seq.request_resize(extent(0, 0));

    assert_eq!(seq.tick().unwrap(), TickOutcome::Suspended);
    assert!(log.borrow().is_empty());

    seq.request_resize(extent(640, 480));
    assert!(matches!(seq.tick().unwrap(), TickOutcome::Presented { .. }));
    assert_eq!(log.borrow()[0], Event::Rebuild(extent(640, 480)));
}

#[test]
fn test_minimize_seen_only_by_swapchain_suspends() {
    let (mut seq, log) = sequencer(800, 600, 2);
    seq.tick().unwrap();

    // The compositor shrinks the surface before any resize event arrives
    seq.backend_mut().resize_surface(0, 0);
    assert_eq!(seq.tick().unwrap(), TickOutcome::Suspended);
    assert!(seq.needs_rebuild());
    assert_eq!(seq.rebuilds(), 0);
    assert_eq!(seq.frames_submitted(), 1);
    assert_eq!(seq.backend().extent, extent(800, 600));
    assert!(!log.borrow().iter().any(|e| matches!(e, Event::Rebuild(_))));

    // Still minimized: the pending rebuild keeps deferring
    assert_eq!(seq.tick().unwrap(), TickOutcome::Suspended);
    assert_eq!(seq.frames_submitted(), 1);

    seq.backend_mut().resize_surface(640, 480);
    assert!(matches!(
        seq.tick().unwrap(),
        TickOutcome::Presented { slot: 1, .. }
    ));
    assert_eq!(seq.rebuilds(), 1);
    assert!(!seq.needs_rebuild());
    assert!(log.borrow().contains(&Event::Rebuild(extent(640, 480))));
}

#[test]
fn test_shutdown_idles_before_release() {
    let (mut seq, log) = sequencer(800, 600, 2);
    seq.tick().unwrap();
    seq.tick().unwrap();

    seq.shutdown().unwrap();
    assert!(seq.is_shut_down());

    let events = log.borrow();
    let teardown: Vec<_> = events
        .iter()
        .skip_while(|e| **e != Event::WaitIdle)
        .cloned()
        .collect();
    let mut expected = vec![Event::WaitIdle];
    expected.extend(CreationStage::teardown_order().map(Event::Release));
    assert_eq!(teardown, expected);
}

#[test]
fn test_shutdown_is_idempotent_and_stops_ticks() {
    let (mut seq, log) = sequencer(800, 600, 2);
    seq.shutdown().unwrap();
    seq.shutdown().unwrap();
    assert_eq!(seq.tick().unwrap(), TickOutcome::Suspended);

    let releases = log
        .borrow()
        .iter()
        .filter(|e| matches!(e, Event::Release(_)))
        .count();
    assert_eq!(releases, CreationStage::ALL.len());
}

#[test]
fn test_failed_idle_still_tears_down() {
    let (mut seq, log) = sequencer(800, 600, 2);
    seq.backend_mut().idle_failure = Some(vk::Result::ERROR_DEVICE_LOST);

    let err = seq.shutdown().unwrap_err();
    assert!(matches!(
        err,
        FrameError::Device {
            phase: TickPhase::Teardown,
            ..
        }
    ));
    assert_eq!(
        log.borrow().last(),
        Some(&Event::Release(CreationStage::Instance))
    );
}

#[test]
fn test_drop_tears_down() {
    let (mut seq, log) = sequencer(800, 600, 2);
    seq.tick().unwrap();
    drop(seq);

    let events = log.borrow();
    assert!(events.contains(&Event::WaitIdle));
    assert_eq!(
        events.last(),
        Some(&Event::Release(CreationStage::Instance))
    );
}
