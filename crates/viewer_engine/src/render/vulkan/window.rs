//! Window management using GLFW
//!
//! The renderer only needs a few things from a window; those sit behind
//! [`SurfaceWindow`] so swapchain recreation can be exercised without a display.

use ash::vk;
use thiserror::Error;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    #[error("GLFW initialization failed")]
    InitializationFailed,

    #[error("Window creation failed")]
    CreationFailed,

    #[error("GLFW error: {0}")]
    GlfwError(String),
}

pub type WindowResult<T> = Result<T, WindowError>;

/// The window operations the renderer depends on
pub trait SurfaceWindow {
    /// Framebuffer size in pixels
    fn framebuffer_size(&self) -> (u32, u32);

    /// Block until at least one window event arrives
    fn wait_events(&mut self);

    /// True once the user has asked to close the window
    fn should_close(&self) -> bool;

    /// Instance extensions needed to present to this window
    fn required_instance_extensions(&self) -> WindowResult<Vec<String>>;

    /// Create a presentable surface for this window
    fn create_surface(&mut self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR>;
}

/// Block until the framebuffer has a nonzero size (e.g. the window is no longer minimized)
///
/// Returns `None` if the window is closed while waiting.
pub fn wait_for_nonzero_extent<W: SurfaceWindow + ?Sized>(window: &mut W) -> Option<vk::Extent2D> {
    let (mut width, mut height) = window.framebuffer_size();
    while width == 0 || height == 0 {
        if window.should_close() {
            return None;
        }
        window.wait_events();
        (width, height) = window.framebuffer_size();
    }
    Some(vk::Extent2D { width, height })
}

/// GLFW window wrapper with proper resource management
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    pub fn new(title: &str, width: u32, height: u32) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;

        if !glfw.vulkan_supported() {
            return Err(WindowError::GlfwError("Vulkan loader not found".to_string()));
        }

        // No OpenGL context
        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        Ok(Self { glfw, window, events })
    }

    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
    }

    /// Drain pending events, returning true if the framebuffer was resized
    ///
    /// Escape requests close.
    pub fn drain_events(&mut self) -> bool {
        let mut resized = false;
        let mut close_requested = false;
        for (_, event) in glfw::flush_messages(&self.events) {
            match event {
                glfw::WindowEvent::FramebufferSize(..) => resized = true,
                glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => close_requested = true,
                _ => {}
            }
        }
        if close_requested {
            self.window.set_should_close(true);
        }
        resized
    }
}

impl SurfaceWindow for Window {
    fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    fn wait_events(&mut self) {
        self.glfw.wait_events();
    }

    fn should_close(&self) -> bool {
        self.window.should_close()
    }

    fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| WindowError::GlfwError("Failed to get required extensions".to_string()))
    }

    fn create_surface(&mut self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::GlfwError(format!("Failed to create Vulkan surface: {:?}", result)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Window double that replays a scripted sequence of framebuffer sizes
    struct ScriptedWindow {
        sizes: VecDeque<(u32, u32)>,
        current: (u32, u32),
        waits: usize,
        close_after_waits: Option<usize>,
    }

    impl ScriptedWindow {
        fn new(initial: (u32, u32), later: &[(u32, u32)]) -> Self {
            Self {
                sizes: later.iter().copied().collect(),
                current: initial,
                waits: 0,
                close_after_waits: None,
            }
        }

        fn closing_after(mut self, waits: usize) -> Self {
            self.close_after_waits = Some(waits);
            self
        }
    }

    impl SurfaceWindow for ScriptedWindow {
        fn framebuffer_size(&self) -> (u32, u32) {
            self.current
        }

        fn wait_events(&mut self) {
            self.waits += 1;
            if let Some(next) = self.sizes.pop_front() {
                self.current = next;
            }
        }

        fn should_close(&self) -> bool {
            self.close_after_waits.is_some_and(|limit| self.waits >= limit)
        }

        fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
            Ok(vec!["VK_KHR_surface".to_string()])
        }

        fn create_surface(&mut self, _instance: vk::Instance) -> WindowResult<vk::SurfaceKHR> {
            Err(WindowError::GlfwError("no display in tests".to_string()))
        }
    }

    #[test]
    fn test_nonzero_extent_returns_immediately() {
        let mut window = ScriptedWindow::new((800, 600), &[]);
        let extent = wait_for_nonzero_extent(&mut window).unwrap();
        assert_eq!((extent.width, extent.height), (800, 600));
        assert_eq!(window.waits, 0);
    }

    #[test]
    fn test_minimized_window_blocks_until_restored() {
        let mut window = ScriptedWindow::new((0, 0), &[(0, 0), (640, 0), (640, 480)]);
        let extent = wait_for_nonzero_extent(&mut window).unwrap();
        assert_eq!((extent.width, extent.height), (640, 480));
        assert_eq!(window.waits, 3);
    }

    #[test]
    fn test_close_while_minimized_stops_waiting() {
        // Stays minimized forever; only the close request ends the wait
        let mut window = ScriptedWindow::new((0, 0), &[]).closing_after(2);
        assert!(wait_for_nonzero_extent(&mut window).is_none());
        assert_eq!(window.waits, 2);
    }

    #[test]
    fn test_closed_window_with_valid_size_still_reports_extent() {
        let mut window = ScriptedWindow::new((320, 240), &[]).closing_after(0);
        let extent = wait_for_nonzero_extent(&mut window).unwrap();
        assert_eq!((extent.width, extent.height), (320, 240));
    }
}
