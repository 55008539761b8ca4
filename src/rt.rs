//! RT module: the produce callback.

// IMPORTANT: Do not call assert_invariant or any PPT logging in RT paths to avoid locks/allocs.

use crate::buffer::Recycle;
use crate::control::{SequenceWriter, PROP_VOLUME};
use crate::error::{NodeError, Result};
use crate::format::{AudioFormat, SampleFormat};
use crate::invariant_rt::{signal, RtSignal, SignalKind};
use crate::io::{IoBuffers, INVALID_ID};
use crate::port::PortState;
use crate::states::PortGenerator;
use rtrb::Producer;

/// Outcome of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// At least one port published a buffer.
    HaveData,
    /// Nothing was published.
    NoData,
}

/// Produce one buffer per bound port.
///
/// Ports without a data mailbox are skipped. Running out of free buffers on
/// any port fails the whole cycle.
pub fn process_ports(
    ports: &mut [PortState],
    volume: f32,
    frequency: f32,
    tx: &mut Producer<RtSignal>,
) -> Result<ProcessStatus> {
    let mut produced = false;
    for port in ports.iter_mut() {
        if produce_port(port, volume, frequency, tx)? {
            produced = true;
        }
    }
    Ok(if produced {
        ProcessStatus::HaveData
    } else {
        ProcessStatus::NoData
    })
}

fn produce_port(
    port: &mut PortState,
    volume: f32,
    frequency: f32,
    tx: &mut Producer<RtSignal>,
) -> Result<bool> {
    let Some(io_ptr) = port.io else {
        return Ok(false);
    };
    // SAFETY: validity while bound is the contract of port_set_io.
    let io: &IoBuffers = unsafe { io_ptr.as_ref() };
    let port_id = port.id;

    let returned = io.take_buffer_id();
    if returned != INVALID_ID && (returned as usize) < port.pool.len() {
        match port.pool.recycle(returned) {
            Recycle::Recycled => signal(tx, SignalKind::BufferRecycled, port_id, returned),
            Recycle::AlreadyFree => signal(tx, SignalKind::DuplicateRecycle, port_id, returned),
            Recycle::Unknown => {}
        }
    }

    let Some(id) = port.pool.acquire() else {
        signal(tx, SignalKind::Starvation, port_id, INVALID_ID);
        return Err(NodeError::Starvation { port_id });
    };

    let Some(format) = port.format else {
        port.pool.recycle(id);
        signal(tx, SignalKind::NoFormat, port_id, id);
        return Ok(false);
    };

    let max_size = port.pool.max_size(id).unwrap_or(0);
    if let Some(dest) = port.pool.data_mut(id) {
        fill(&mut port.generator, &format, volume, frequency, dest);
    }
    if let Some(chunk) = port.pool.chunk(id) {
        chunk.stamp(0, max_size, 0);
    }
    io.publish(id);
    signal(tx, SignalKind::BufferDelivered, port_id, id);

    if let Some(area) = port.notify.as_mut() {
        let value = port.generator.next_volume();
        let written = match SequenceWriter::begin(area.bytes_mut()) {
            Some(mut writer) => {
                let pushed = writer.push_float_property(0, PROP_VOLUME, value);
                writer.finish();
                pushed
            }
            None => false,
        };
        if !written {
            signal(tx, SignalKind::NotifyOverflow, port_id, id);
        }
    }
    Ok(true)
}

/// Fill `dest` with whole frames of the tone. Planar layouts fill the
/// single data block with one channel.
pub fn fill(
    generator: &mut PortGenerator,
    format: &AudioFormat,
    volume: f32,
    frequency: f32,
    dest: &mut [u8],
) {
    let bytes = format.sample_format.bytes_per_sample() as usize;
    let frame_bytes = format.stride() as usize;
    if frame_bytes == 0 {
        return;
    }
    for frame in dest.chunks_exact_mut(frame_bytes) {
        let value = generator.next_sample(frequency, format.rate) * volume;
        match format.sample_format {
            SampleFormat::S16 | SampleFormat::S16P => {
                let sample = (value * 32767.0) as i16;
                for slot in frame.chunks_exact_mut(bytes) {
                    slot.copy_from_slice(&sample.to_ne_bytes());
                }
            }
            SampleFormat::F32 | SampleFormat::F32P => {
                for slot in frame.chunks_exact_mut(bytes) {
                    slot.copy_from_slice(&value.to_ne_bytes());
                }
            }
        }
    }
}
