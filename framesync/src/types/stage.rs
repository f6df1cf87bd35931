//! Pipeline stage and memory access flags.

use bitflags::bitflags;

bitflags! {
    /// Pipeline stages that a dependency can wait for or unblock.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStage: u32 {
        /// Start of the pipeline. Waiting on it waits for nothing.
        const TOP_OF_PIPE = 1 << 0;
        /// Indirect command parameter reads.
        const DRAW_INDIRECT = 1 << 1;
        /// Vertex and index buffer reads.
        const VERTEX_INPUT = 1 << 2;
        /// Vertex shader execution.
        const VERTEX_SHADER = 1 << 3;
        /// Fragment shader execution.
        const FRAGMENT_SHADER = 1 << 4;
        /// Early depth/stencil tests.
        const EARLY_FRAGMENT_TESTS = 1 << 5;
        /// Late depth/stencil tests.
        const LATE_FRAGMENT_TESTS = 1 << 6;
        /// Color attachment writes.
        const COLOR_ATTACHMENT_OUTPUT = 1 << 7;
        /// Compute shader execution.
        const COMPUTE_SHADER = 1 << 8;
        /// Copy, blit, fill and clear commands.
        const TRANSFER = 1 << 9;
        /// End of the pipeline.
        const BOTTOM_OF_PIPE = 1 << 10;
        /// Host access to device memory.
        const HOST = 1 << 11;
        /// Every graphics stage.
        const ALL_GRAPHICS = 1 << 12;
        /// Every command on the queue.
        const ALL_COMMANDS = 1 << 13;
        /// Acceleration structure builds.
        const ACCELERATION_STRUCTURE_BUILD = 1 << 14;
        /// Ray tracing shader execution.
        const RAY_TRACING_SHADER = 1 << 15;
    }
}

impl Default for PipelineStage {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Memory access types made available or visible by a dependency.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryAccess: u32 {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const INDEX_READ = 1 << 1;
        const VERTEX_ATTRIBUTE_READ = 1 << 2;
        const UNIFORM_READ = 1 << 3;
        const INPUT_ATTACHMENT_READ = 1 << 4;
        const SHADER_READ = 1 << 5;
        const SHADER_WRITE = 1 << 6;
        const COLOR_ATTACHMENT_READ = 1 << 7;
        const COLOR_ATTACHMENT_WRITE = 1 << 8;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 9;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 10;
        const TRANSFER_READ = 1 << 11;
        const TRANSFER_WRITE = 1 << 12;
        const HOST_READ = 1 << 13;
        const HOST_WRITE = 1 << 14;
        /// Any read access.
        const ANY_READ = 1 << 15;
        /// Any write access.
        const ANY_WRITE = 1 << 16;
        const ACCELERATION_STRUCTURE_READ = 1 << 17;
        const ACCELERATION_STRUCTURE_WRITE = 1 << 18;

        /// Any access at all.
        const ANY = Self::ANY_READ.bits() | Self::ANY_WRITE.bits();

        /// Union of every read flag.
        const READS = Self::INDIRECT_COMMAND_READ.bits()
            | Self::INDEX_READ.bits()
            | Self::VERTEX_ATTRIBUTE_READ.bits()
            | Self::UNIFORM_READ.bits()
            | Self::INPUT_ATTACHMENT_READ.bits()
            | Self::SHADER_READ.bits()
            | Self::COLOR_ATTACHMENT_READ.bits()
            | Self::DEPTH_STENCIL_ATTACHMENT_READ.bits()
            | Self::TRANSFER_READ.bits()
            | Self::HOST_READ.bits()
            | Self::ANY_READ.bits()
            | Self::ACCELERATION_STRUCTURE_READ.bits();

        /// Union of every write flag.
        const WRITES = Self::SHADER_WRITE.bits()
            | Self::COLOR_ATTACHMENT_WRITE.bits()
            | Self::DEPTH_STENCIL_ATTACHMENT_WRITE.bits()
            | Self::TRANSFER_WRITE.bits()
            | Self::HOST_WRITE.bits()
            | Self::ANY_WRITE.bits()
            | Self::ACCELERATION_STRUCTURE_WRITE.bits();
    }
}

impl Default for MemoryAccess {
    fn default() -> Self {
        Self::empty()
    }
}

/// Destination access of a dependency: the reads that must see prior writes.
///
/// Before-operation barrier handlers receive this, since the wrapped
/// operation is what consumes the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadAccess(MemoryAccess);

impl ReadAccess {
    /// Wrap a read access mask.
    ///
    /// # Panics
    ///
    /// Panics if `access` contains write flags.
    pub fn new(access: MemoryAccess) -> Self {
        assert!(
            MemoryAccess::READS.contains(access),
            "ReadAccess must only contain read flags, got {access:?}"
        );
        Self(access)
    }

    /// The wrapped access mask.
    pub fn access(self) -> MemoryAccess {
        self.0
    }
}

/// Source access of a dependency: the writes that must be made available.
///
/// After-operation barrier handlers receive this, since the wrapped
/// operation is what produced the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriteAccess(MemoryAccess);

impl WriteAccess {
    /// Wrap a write access mask.
    ///
    /// # Panics
    ///
    /// Panics if `access` contains read flags.
    pub fn new(access: MemoryAccess) -> Self {
        assert!(
            MemoryAccess::WRITES.contains(access),
            "WriteAccess must only contain write flags, got {access:?}"
        );
        Self(access)
    }

    /// The wrapped access mask.
    pub fn access(self) -> MemoryAccess {
        self.0
    }
}

impl From<ReadAccess> for MemoryAccess {
    fn from(value: ReadAccess) -> Self {
        value.0
    }
}

impl From<WriteAccess> for MemoryAccess {
    fn from(value: WriteAccess) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_and_writes_are_disjoint() {
        assert!(MemoryAccess::READS.intersection(MemoryAccess::WRITES).is_empty());
        assert_eq!(
            MemoryAccess::ANY,
            MemoryAccess::ANY_READ | MemoryAccess::ANY_WRITE
        );
    }

    #[test]
    fn test_read_access_wraps() {
        let read = ReadAccess::new(MemoryAccess::SHADER_READ | MemoryAccess::TRANSFER_READ);
        assert!(read.access().contains(MemoryAccess::SHADER_READ));
        assert_eq!(
            MemoryAccess::from(read),
            MemoryAccess::SHADER_READ | MemoryAccess::TRANSFER_READ
        );
    }

    #[test]
    #[should_panic(expected = "ReadAccess must only contain read flags")]
    fn test_read_access_rejects_writes() {
        ReadAccess::new(MemoryAccess::TRANSFER_WRITE);
    }

    #[test]
    #[should_panic(expected = "WriteAccess must only contain write flags")]
    fn test_write_access_rejects_reads() {
        WriteAccess::new(MemoryAccess::ANY_READ);
    }
}
