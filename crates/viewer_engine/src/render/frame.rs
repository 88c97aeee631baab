//! Frame protocol
//!
//! [`FrameCycle`] drives one frame through wait, acquire, update, reset,
//! record, submit, present and advance. The device-facing half lives behind
//! [`FrameBackend`] so the ordering can be exercised without a GPU.

use ash::vk;

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Interpreted result of acquiring a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image ready to render into
    Ready(u32),
    /// Surface is out of date and must be recreated
    Stale,
}

/// Interpreted result of presenting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented (or not) but the surface must be recreated
    Stale,
}

/// What happened during one call to [`FrameCycle::draw_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Frame submitted and presented
    Presented,
    /// Frame submitted, then the surface was recreated
    PresentedAndRecreated,
    /// Acquire found the surface stale; it was recreated and the frame skipped
    Skipped,
}

/// SUCCESS and SUBOPTIMAL render; OUT_OF_DATE recreates; anything else is fatal
pub fn classify_acquire(result: vk::Result, image_index: u32) -> VulkanResult<AcquireOutcome> {
    match result {
        vk::Result::SUCCESS | vk::Result::SUBOPTIMAL_KHR => Ok(AcquireOutcome::Ready(image_index)),
        vk::Result::ERROR_OUT_OF_DATE_KHR => Ok(AcquireOutcome::Stale),
        other => Err(VulkanError::Api(other)),
    }
}

/// OUT_OF_DATE, SUBOPTIMAL or a pending resize recreate; other failures are fatal
pub fn classify_present(result: vk::Result, resize_pending: bool) -> VulkanResult<PresentOutcome> {
    match result {
        vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR => Ok(PresentOutcome::Stale),
        vk::Result::SUCCESS if resize_pending => Ok(PresentOutcome::Stale),
        vk::Result::SUCCESS => Ok(PresentOutcome::Presented),
        other => Err(VulkanError::Api(other)),
    }
}

/// Device-facing steps of a frame
///
/// `frame` is always the frame-in-flight slot; `image_index` is always the
/// acquired swapchain image.
pub trait FrameBackend {
    /// Block until the slot's previous submission has finished
    fn wait_for_frame(&mut self, frame: usize) -> VulkanResult<()>;

    /// Acquire an image, signalling the slot's acquire semaphore; returns the raw result
    fn acquire_image(&mut self, frame: usize) -> VulkanResult<(vk::Result, u32)>;

    /// Rebuild the swapchain and everything sized from it
    fn recreate_surface(&mut self) -> VulkanResult<()>;

    /// Write this slot's uniform data
    fn update_uniforms(&mut self, frame: usize) -> VulkanResult<()>;

    /// Reset the slot's fence and command buffer
    fn reset_frame(&mut self, frame: usize) -> VulkanResult<()>;

    /// Record the draw into the slot's command buffer
    fn record_frame(&mut self, frame: usize, image_index: u32) -> VulkanResult<()>;

    /// Submit, waiting on the slot's acquire semaphore and signalling the image's
    /// render-complete semaphore plus the slot's fence
    fn submit_frame(&mut self, frame: usize, image_index: u32) -> VulkanResult<()>;

    /// Present the image after its render-complete semaphore; returns the raw result
    fn present_image(&mut self, image_index: u32) -> VulkanResult<vk::Result>;

    /// Consume a pending framebuffer-resize notification
    fn take_resize_request(&mut self) -> bool;
}

/// Frame-in-flight bookkeeping
#[derive(Debug, Clone)]
pub struct FrameCycle {
    frames_in_flight: usize,
    current: usize,
}

impl FrameCycle {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            current: 0,
        }
    }

    /// Slot the next frame will use
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Run one frame against `backend`
    pub fn draw_frame<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> VulkanResult<FrameStatus> {
        let frame = self.current;

        backend.wait_for_frame(frame)?;

        let (result, index) = backend.acquire_image(frame)?;
        let image_index = match classify_acquire(result, index)? {
            AcquireOutcome::Ready(image_index) => image_index,
            AcquireOutcome::Stale => {
                log::debug!("Swapchain out of date at acquire; recreating");
                backend.recreate_surface()?;
                return Ok(FrameStatus::Skipped);
            }
        };

        backend.update_uniforms(frame)?;
        backend.reset_frame(frame)?;
        backend.record_frame(frame, image_index)?;
        backend.submit_frame(frame, image_index)?;

        let present_result = backend.present_image(image_index)?;
        let resize_pending = backend.take_resize_request();
        let status = match classify_present(present_result, resize_pending)? {
            PresentOutcome::Presented => FrameStatus::Presented,
            PresentOutcome::Stale => {
                log::debug!("Swapchain stale after present ({:?}); recreating", present_result);
                backend.recreate_surface()?;
                FrameStatus::PresentedAndRecreated
            }
        };

        self.current = (self.current + 1) % self.frames_in_flight;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Recreate,
        Update(usize),
        Reset(usize),
        Record(usize, u32),
        Submit(usize, u32),
        Present(u32),
    }

    /// Backend double that records calls and replays scripted driver results
    struct RecordingBackend {
        calls: Vec<Call>,
        image_count: u32,
        next_image: u32,
        acquire_results: VecDeque<vk::Result>,
        present_results: VecDeque<vk::Result>,
        resize_requested: bool,
    }

    impl RecordingBackend {
        fn new(image_count: u32) -> Self {
            Self {
                calls: Vec::new(),
                image_count,
                next_image: 0,
                acquire_results: VecDeque::new(),
                present_results: VecDeque::new(),
                resize_requested: false,
            }
        }
    }

    impl FrameBackend for RecordingBackend {
        fn wait_for_frame(&mut self, frame: usize) -> VulkanResult<()> {
            self.calls.push(Call::Wait(frame));
            Ok(())
        }

        fn acquire_image(&mut self, frame: usize) -> VulkanResult<(vk::Result, u32)> {
            self.calls.push(Call::Acquire(frame));
            let result = self.acquire_results.pop_front().unwrap_or(vk::Result::SUCCESS);
            let image = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok((result, image))
        }

        fn recreate_surface(&mut self) -> VulkanResult<()> {
            self.calls.push(Call::Recreate);
            Ok(())
        }

        fn update_uniforms(&mut self, frame: usize) -> VulkanResult<()> {
            self.calls.push(Call::Update(frame));
            Ok(())
        }

        fn reset_frame(&mut self, frame: usize) -> VulkanResult<()> {
            self.calls.push(Call::Reset(frame));
            Ok(())
        }

        fn record_frame(&mut self, frame: usize, image_index: u32) -> VulkanResult<()> {
            self.calls.push(Call::Record(frame, image_index));
            Ok(())
        }

        fn submit_frame(&mut self, frame: usize, image_index: u32) -> VulkanResult<()> {
            self.calls.push(Call::Submit(frame, image_index));
            Ok(())
        }

        fn present_image(&mut self, image_index: u32) -> VulkanResult<vk::Result> {
            self.calls.push(Call::Present(image_index));
            Ok(self.present_results.pop_front().unwrap_or(vk::Result::SUCCESS))
        }

        fn take_resize_request(&mut self) -> bool {
            std::mem::take(&mut self.resize_requested)
        }
    }

    #[test]
    fn test_frame_index_cycles_with_two_frames_in_flight() {
        let mut cycle = FrameCycle::new(2);
        let mut backend = RecordingBackend::new(3);
        let mut observed = Vec::new();

        for _ in 0..5 {
            observed.push(cycle.current());
            assert_eq!(cycle.draw_frame(&mut backend).unwrap(), FrameStatus::Presented);
        }

        assert_eq!(observed, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_call_order_within_a_frame() {
        let mut cycle = FrameCycle::new(2);
        let mut backend = RecordingBackend::new(3);
        cycle.draw_frame(&mut backend).unwrap();

        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Update(0),
                Call::Reset(0),
                Call::Record(0, 0),
                Call::Submit(0, 0),
                Call::Present(0),
            ]
        );
    }

    #[test]
    fn test_submit_uses_image_index_not_frame_index() {
        let mut cycle = FrameCycle::new(2);
        let mut backend = RecordingBackend::new(3);

        for _ in 0..6 {
            cycle.draw_frame(&mut backend).unwrap();
        }

        let submits: Vec<(usize, u32)> = backend
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Submit(frame, image) => Some((*frame, *image)),
                _ => None,
            })
            .collect();

        // Frame slots repeat every 2, images every 3
        assert_eq!(submits, vec![(0, 0), (1, 1), (0, 2), (1, 0), (0, 1), (1, 2)]);

        let presents: Vec<u32> = backend
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Present(image) => Some(*image),
                _ => None,
            })
            .collect();
        let submitted_images: Vec<u32> = submits.iter().map(|&(_, image)| image).collect();
        assert_eq!(presents, submitted_images);
    }

    #[test]
    fn test_fence_is_waited_before_reset_and_reset_before_submit() {
        let mut cycle = FrameCycle::new(2);
        let mut backend = RecordingBackend::new(3);
        for _ in 0..4 {
            cycle.draw_frame(&mut backend).unwrap();
        }

        for frame in 0..2 {
            let position = |wanted: &Call| backend.calls.iter().position(|c| c == wanted);
            let wait = position(&Call::Wait(frame)).unwrap();
            let reset = position(&Call::Reset(frame)).unwrap();
            let submit = backend
                .calls
                .iter()
                .position(|c| matches!(c, Call::Submit(f, _) if *f == frame))
                .unwrap();
            assert!(wait < reset && reset < submit);
        }
    }

    #[test]
    fn test_out_of_date_acquire_recreates_and_skips() {
        let mut cycle = FrameCycle::new(2);
        let mut backend = RecordingBackend::new(3);
        backend.acquire_results.push_back(vk::Result::ERROR_OUT_OF_DATE_KHR);

        let status = cycle.draw_frame(&mut backend).unwrap();

        assert_eq!(status, FrameStatus::Skipped);
        assert_eq!(backend.calls, vec![Call::Wait(0), Call::Acquire(0), Call::Recreate]);
        assert_eq!(cycle.current(), 0);
    }

    #[test]
    fn test_suboptimal_acquire_still_renders() {
        let mut cycle = FrameCycle::new(2);
        let mut backend = RecordingBackend::new(3);
        backend.acquire_results.push_back(vk::Result::SUBOPTIMAL_KHR);

        assert_eq!(cycle.draw_frame(&mut backend).unwrap(), FrameStatus::Presented);
        assert!(backend.calls.contains(&Call::Present(0)));
    }

    #[test]
    fn test_fatal_acquire_error_propagates() {
        let mut cycle = FrameCycle::new(2);
        let mut backend = RecordingBackend::new(3);
        backend.acquire_results.push_back(vk::Result::ERROR_DEVICE_LOST);

        let result = cycle.draw_frame(&mut backend);
        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))));
        assert!(!backend.calls.contains(&Call::Recreate));
    }

    #[test]
    fn test_stale_present_recreates_and_advances() {
        let mut cycle = FrameCycle::new(2);
        let mut backend = RecordingBackend::new(3);
        backend.present_results.push_back(vk::Result::SUBOPTIMAL_KHR);

        let status = cycle.draw_frame(&mut backend).unwrap();
        assert_eq!(status, FrameStatus::PresentedAndRecreated);
        assert_eq!(backend.calls.last(), Some(&Call::Recreate));
        assert_eq!(cycle.current(), 1);
    }

    #[test]
    fn test_resize_request_recreates_after_present() {
        let mut cycle = FrameCycle::new(2);
        let mut backend = RecordingBackend::new(3);
        backend.resize_requested = true;

        assert_eq!(
            cycle.draw_frame(&mut backend).unwrap(),
            FrameStatus::PresentedAndRecreated
        );
        assert!(!backend.resize_requested);
        assert_eq!(cycle.draw_frame(&mut backend).unwrap(), FrameStatus::Presented);
    }

    #[test]
    fn test_classify_results() {
        assert_eq!(classify_acquire(vk::Result::SUCCESS, 2).unwrap(), AcquireOutcome::Ready(2));
        assert_eq!(
            classify_acquire(vk::Result::ERROR_OUT_OF_DATE_KHR, 0).unwrap(),
            AcquireOutcome::Stale
        );
        assert_eq!(
            classify_present(vk::Result::ERROR_OUT_OF_DATE_KHR, false).unwrap(),
            PresentOutcome::Stale
        );
        assert_eq!(classify_present(vk::Result::SUCCESS, true).unwrap(), PresentOutcome::Stale);
        assert_eq!(classify_present(vk::Result::SUCCESS, false).unwrap(), PresentOutcome::Presented);
        assert!(classify_present(vk::Result::ERROR_SURFACE_LOST_KHR, false).is_err());
    }
}
