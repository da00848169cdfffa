use crate::config::IterationCount;

/// Infinite vs bounded iteration over the frame sequence.
///
/// `count` is ignored when `infinite` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatPolicy {
    pub infinite: bool,
    pub count: u32,
}

impl RepeatPolicy {
    pub const FOREVER: Self = Self { infinite: true, count: 0 };

    pub fn times(count: u32) -> Self {
        Self { infinite: false, count }
    }

    /// Resolve the requested iteration count. `Source` defers to the loop
    /// extension in the stream: a stored loop count `n` means the sequence
    /// repeats `n` times after the first pass.
    pub fn resolve(iterations: IterationCount, stream_repeat: gif::Repeat) -> Self {
        match iterations {
            IterationCount::Infinite => Self::FOREVER,
            IterationCount::Finite(n) => Self::times(n),
            IterationCount::Source => match stream_repeat {
                gif::Repeat::Infinite => Self::FOREVER,
                gif::Repeat::Finite(n) => Self::times(u32::from(n) + 1),
            },
        }
    }

    /// Whether pass number `pass` (0-based) may be played.
    pub fn permits_pass(&self, pass: u32) -> bool {
        self.infinite || pass < self.count
    }
}
