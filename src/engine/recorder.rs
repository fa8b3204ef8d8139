//! WAV capture of rendered blocks

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Writes rendered blocks to a mono 32-bit float WAV file
pub struct Recorder {
    writer: WavWriter<BufWriter<File>>,
    sample_rate: u32,
    frames: u64,
    peak: f32,
}

impl Recorder {
    /// Create the output file
    pub fn new(path: &Path, sample_rate: u32) -> Result<Self> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };

        let writer = WavWriter::create(path, spec)
            .with_context(|| format!("failed to create WAV file: {:?}", path))?;

        Ok(Self {
            writer,
            sample_rate,
            frames: 0,
            peak: 0.0,
        })
    }

    /// Append one rendered block
    pub fn write_block(&mut self, block: &[f32]) -> Result<()> {
        for &sample in block {
            self.writer
                .write_sample(sample)
                .context("failed to write sample")?;
            self.peak = self.peak.max(sample.abs());
        }
        self.frames += block.len() as u64;
        Ok(())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Largest absolute sample written so far
    pub fn peak(&self) -> f32 {
        self.peak
    }

    /// Length of the recording in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    /// Write the header and close the file
    pub fn finalize(self) -> Result<()> {
        self.writer.finalize().context("failed to finalize WAV file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_block_accounting() {
        let file = NamedTempFile::new().unwrap();
        let mut recorder = Recorder::new(file.path(), 8000).unwrap();
        recorder.write_block(&[0.25, -0.75, 0.5]).unwrap();
        recorder.write_block(&[0.0; 7997]).unwrap();

        assert_eq!(recorder.frames(), 8000);
        assert_eq!(recorder.peak(), 0.75);
        assert!((recorder.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_recording_reads_back() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        let mut recorder = Recorder::new(&path, 48000).unwrap();
        let ramp: Vec<f32> = (0..256).map(|i| i as f32 / 255.0).collect();
        recorder.write_block(&ramp).unwrap();
        recorder.finalize().unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.sample_format, SampleFormat::Float);

        let samples: Vec<f32> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, ramp);
    }
}
