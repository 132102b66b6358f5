// src/main.rs
//
// Offline render: feeds a synthesized sung phrase through the effect and
// writes the result to a wav file.
//
//     countertune-render [out.wav]

use std::error::Error;
use std::f64::consts::TAU;

use hound::{SampleFormat, WavSpec, WavWriter};
use log::{LevelFilter, info};
use simple_logger::SimpleLogger;

use countertune::{AudioBuffer, Engine, EngineConfig, ParamId, create_bridge, midi_to_freq};

const SAMPLE_RATE: u32 = 44_100;
const CHANNELS: usize = 2;
const BLOCK_SIZE: usize = 256;

/// (midi note, seconds); 0 is a breath
const PHRASE: &[(u8, f64)] = &[
    (60, 0.5),
    (62, 0.5),
    (64, 1.0),
    (67, 0.5),
    (65, 0.5),
    (64, 1.0),
    (0, 0.25),
    (62, 0.75),
    (60, 1.0),
];

const PHRASE_REPEATS: usize = 3;
const TAIL_SECONDS: f64 = 2.0;

/// Harmonic voice with vibrato and a soft onset per note.
struct Singer {
    phase: f64,
    vibrato_phase: f64,
}

impl Singer {
    fn new() -> Self {
        Self {
            phase: 0.0,
            vibrato_phase: 0.0,
        }
    }

    fn render_note(&mut self, note: u8, seconds: f64, out: &mut Vec<f32>) {
        let frames = (seconds * SAMPLE_RATE as f64) as usize;
        if note == 0 {
            out.extend(std::iter::repeat_n(0.0, frames));
            return;
        }
        let base = midi_to_freq(note);
        let sr = SAMPLE_RATE as f64;
        for i in 0..frames {
            let vibrato = 1.0 + 0.004 * (self.vibrato_phase).sin();
            self.vibrato_phase += TAU * 5.5 / sr;
            self.phase += TAU * base * vibrato / sr;

            let mut sample = 0.0;
            for (k, amp) in [1.0, 0.5, 0.3, 0.15, 0.08].iter().enumerate() {
                sample += amp * (self.phase * (k + 1) as f64).sin();
            }
            let onset = (i as f64 / (0.02 * sr)).min(1.0);
            let release = ((frames - i) as f64 / (0.02 * sr)).min(1.0);
            out.push((sample * 0.25 * onset * release) as f32);
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    SimpleLogger::new().with_level(LevelFilter::Info).init()?;

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "countertune.wav".to_string());

    // Input phrase (mono, duplicated across channels below)
    let mut singer = Singer::new();
    let mut voice = Vec::new();
    for _ in 0..PHRASE_REPEATS {
        for &(note, seconds) in PHRASE {
            singer.render_note(note, seconds, &mut voice);
        }
    }
    voice.extend(std::iter::repeat_n(
        0.0,
        (TAIL_SECONDS * SAMPLE_RATE as f64) as usize,
    ));

    let config = EngineConfig::new(SAMPLE_RATE as f64, CHANNELS).with_max_block_size(BLOCK_SIZE);
    let (control, mut audio) = create_bridge(Engine::new(config)?);
    control.set_param(ParamId::Tempo, 100.0);
    control.set_param(ParamId::CycleLength, 8.0);
    control.set_param(ParamId::Density, 4.0);
    control.set_param(ParamId::Key, 0.0);
    control.set_param(ParamId::Octave, 1.0);
    control.set_param(ParamId::Mix, 0.6);

    let spec = WavSpec {
        channels: CHANNELS as u16,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&path, spec)?;

    let mut input = vec![0.0_f32; CHANNELS * BLOCK_SIZE];
    let mut output = vec![0.0_f32; CHANNELS * BLOCK_SIZE];
    let mut cycles = 0;

    for block in voice.chunks(BLOCK_SIZE) {
        let frames = block.len();
        for ch in 0..CHANNELS {
            input[ch * frames..(ch + 1) * frames].copy_from_slice(block);
        }

        let in_buf = AudioBuffer::new(&mut input[..CHANNELS * frames], CHANNELS);
        let mut out_buf = AudioBuffer::new(&mut output[..CHANNELS * frames], CHANNELS);
        audio.process(&in_buf, &mut out_buf);

        for i in 0..frames {
            for ch in 0..CHANNELS {
                writer.write_sample(out_buf.channel(ch)[i])?;
            }
        }

        let readback = control.readback();
        if readback.cycles_completed != cycles {
            cycles = readback.cycles_completed;
            info!(
                "cycle {}: input {:?} -> counter-melody {:?}, voice note {}",
                cycles,
                audio.engine().last_captured_melody().slots(),
                audio.engine().generated_melody(),
                readback.voice_note
            );
        }
    }

    writer.finalize()?;
    info!("wrote {} ({} cycles, state {})", path, cycles, control.readback().clock_state);
    Ok(())
}
