//! fd-backed buffers are mapped, written through and unmapped.

use livemix::buffer::{BufferDescriptor, Chunk, DataDescriptor, DataType};
use livemix::harness::SimulatedHost;
use livemix::io::STATUS_NEED_DATA;
use livemix::memory::MappedRegion;
use livemix::{
    AudioFormat, Direction, NodeConfig, NodeError, NodeInterface, ProcessStatus, SampleFormat,
};
use std::io::{Read, Seek, SeekFrom};
use std::os::fd::AsRawFd;
use std::ptr::NonNull;

const SIZE: u32 = 4096;

fn backing_file(len: u64) -> std::fs::File {
    let file = tempfile::tempfile().unwrap();
    file.set_len(len).unwrap();
    file
}

#[test]
fn mapping_is_shared_with_the_file() {
    let mut file = backing_file(SIZE as u64 * 2);
    {
        let region = MappedRegion::map(file.as_raw_fd(), SIZE + 16, 64).unwrap();
        assert_eq!(region.len(), 64);
        unsafe { region.as_ptr().as_ptr().write_bytes(0x5a, 64) };
    }
    let mut contents = Vec::new();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.read_to_end(&mut contents).unwrap();
    let start = SIZE as usize + 16;
    assert!(contents[start..start + 64].iter().all(|&b| b == 0x5a));
    assert_eq!(contents[start - 1], 0);
    assert_eq!(contents[start + 64], 0);
}

#[test]
fn node_writes_into_mapped_buffers() {
    let mut file = backing_file(SIZE as u64 * 2);
    let mut chunks = [Chunk::new(), Chunk::new()];
    let mut host = SimulatedHost::new(NodeConfig {
        ports: 1,
        ..NodeConfig::default()
    })
    .unwrap();
    host.commit_format(0, &AudioFormat::new(SampleFormat::F32, 1, 48000))
        .unwrap();
    let descriptors: Vec<_> = chunks
        .iter_mut()
        .enumerate()
        .map(|(i, chunk)| BufferDescriptor {
            data: DataDescriptor::from_fd(DataType::MemFd, file.as_raw_fd(), i as u32 * SIZE, SIZE),
            chunk: NonNull::from(chunk),
        })
        .collect();
    unsafe {
        host.node
            .port_use_buffers(Direction::Output, 0, &descriptors)
            .unwrap()
    };
    host.bind_io(0).unwrap();

    assert_eq!(host.node.process().unwrap(), ProcessStatus::HaveData);
    assert_eq!(host.io(0).unwrap().buffer_id(), 0);
    let io = host.io(0).unwrap();
    io.store(STATUS_NEED_DATA, io.buffer_id());
    host.node.process().unwrap();

    assert_eq!(chunks[0].size(), SIZE);
    assert_eq!(chunks[1].size(), SIZE);
    drop(host);

    let mut contents = Vec::new();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.read_to_end(&mut contents).unwrap();
    assert!(contents[..SIZE as usize].iter().any(|&b| b != 0));
    assert!(contents[SIZE as usize..].iter().any(|&b| b != 0));
}

#[test]
fn mapping_failure_keeps_previous_pool() {
    let mut host = SimulatedHost::new(NodeConfig {
        ports: 1,
        ..NodeConfig::default()
    })
    .unwrap();
    host.allocate_buffers(0, 2, 256).unwrap();

    let mut chunk = Chunk::new();
    let bad = [BufferDescriptor {
        data: DataDescriptor::from_fd(DataType::DmaBuf, -1, 0, SIZE),
        chunk: NonNull::from(&mut chunk),
    }];
    let err = unsafe { host.node.port_use_buffers(Direction::Output, 0, &bad) }.unwrap_err();
    assert!(matches!(&err, NodeError::Map(io) if io.raw_os_error() == Some(libc::EBADF)));
    assert_eq!(err.errno(), -libc::EBADF);
    assert_eq!(host.node.port(0).unwrap().pool.len(), 2);
}

#[test]
fn partial_mapping_is_undone_on_later_failure() {
    let file = backing_file(SIZE as u64);
    let mut chunks = [Chunk::new(), Chunk::new()];
    let mut host = SimulatedHost::new(NodeConfig {
        ports: 1,
        ..NodeConfig::default()
    })
    .unwrap();
    let [first, second] = &mut chunks;
    let descriptors = [
        BufferDescriptor {
            data: DataDescriptor::from_fd(DataType::MemFd, file.as_raw_fd(), 0, SIZE),
            chunk: NonNull::from(first),
        },
        BufferDescriptor {
            data: DataDescriptor {
                data: None,
                ..DataDescriptor::from_fd(DataType::MemPtr, -1, 0, SIZE)
            },
            chunk: NonNull::from(second),
        },
    ];
    let err = unsafe { host.node.port_use_buffers(Direction::Output, 0, &descriptors) }
        .unwrap_err();
    assert!(matches!(err, NodeError::InvalidBufferMemory { index: 1 }));
    assert!(host.node.port(0).unwrap().pool.is_empty());
}
