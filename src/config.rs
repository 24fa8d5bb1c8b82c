/// Default arena size: 8 MiB.
pub const DEFAULT_ARENA_SIZE: usize = 8 * 1024 * 1024;
pub const DEFAULT_MAX_DEPTH: usize = 2_000;
/// Native stack for the thread that runs the evaluator. Sized so that
/// `DEFAULT_MAX_DEPTH` nested evaluations fit even in unoptimized builds.
pub const EVAL_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Interpreter tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bytes in the allocator arena. Fixed for the lifetime of the interpreter.
    pub arena_size: usize,
    /// Nesting limit for `eval`; deeper recursion fails with `DepthExceeded`.
    pub max_depth: usize,
    /// Log every procedure application at `trace` level.
    pub trace: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            arena_size: DEFAULT_ARENA_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
            trace: false,
        }
    }
}

impl Config {
    pub fn with_arena_size(mut self, arena_size: usize) -> Self {
        self.arena_size = arena_size;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}
