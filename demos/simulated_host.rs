use livemix::harness::SimulatedHost;
use livemix::{AudioFormat, Command, NodeConfig, NodeInterface, SampleFormat};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut host = SimulatedHost::new(NodeConfig {
        ports: 1,
        ..NodeConfig::default()
    })
    .unwrap();

    // Negotiate stereo float at 48 kHz with three buffers
    let format = AudioFormat::new(SampleFormat::F32, 2, 48000);
    host.negotiate(0, &format, 3).unwrap();
    host.node.send_command(Command::Start).unwrap();

    for cycle in 0..8 {
        let status = host.cycle().unwrap();
        let io = host.io(0).unwrap();
        let id = io.buffer_id();
        let samples: Vec<f32> = host
            .buffer_bytes(0, id)
            .unwrap()
            .chunks_exact(4)
            .take(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let volume = host
            .notify_controls(0)
            .and_then(|controls| controls.first().map(|c| c.value));
        println!(
            "cycle {}: {:?} buffer {} first samples {:?} volume {:?}",
            cycle, status, id, samples, volume
        );
    }

    for signal in host.node.drain_rt_signals() {
        println!("{} port {} buffer {}", signal.kind.name(), signal.port_id, signal.buffer_id);
    }

    host.node.send_command(Command::Suspend).unwrap();
}
