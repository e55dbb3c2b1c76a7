//! Line-oriented output for the experiment drivers.
//!
//! Each driver emits one [`Record`] per iteration into a [`RecordSink`]. The
//! file-backed sink, [`Recorder`], opens its target once, buffers writes and is
//! consumed by [`Recorder::finish`], so the file is flushed and closed exactly
//! once. A plain `Vec` collects records in memory instead.

use crate::error::{Result, SimulationError};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// One line of output.
pub trait Record {
    /// Written once before the first record, when present.
    const HEADER: Option<&'static str> = None;

    /// Writes the record without its trailing newline.
    fn write_fields<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()>;
}

pub trait RecordSink<R> {
    fn record(&mut self, record: &R) -> Result<()>;
}

impl<R: Clone> RecordSink<R> for Vec<R> {
    fn record(&mut self, record: &R) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

pub struct Recorder<R, W: Write = BufWriter<File>> {
    writer: W,
    target: PathBuf,
    lines: usize,
    record: PhantomData<fn(&R)>,
}

impl<R: Record> Recorder<R> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| SimulationError::io(path, source))?;
        Self::with_target(BufWriter::new(file), path.to_path_buf())
    }
}

impl<R: Record, W: Write> Recorder<R, W> {
    pub fn from_writer(writer: W) -> Result<Self> {
        Self::with_target(writer, PathBuf::from("<writer>"))
    }

    fn with_target(writer: W, target: PathBuf) -> Result<Self> {
        let mut recorder = Self {
            writer,
            target,
            lines: 0,
            record: PhantomData,
        };
        if let Some(header) = R::HEADER {
            writeln!(recorder.writer, "{header}").map_err(|e| recorder.error(e))?;
        }
        Ok(recorder)
    }

    /// Records written so far, header excluded.
    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Flushes and closes the output, returning the number of records.
    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush().map_err(|e| self.error(e))?;
        Ok(self.lines)
    }

    fn error(&self, source: io::Error) -> SimulationError {
        SimulationError::io(self.target.clone(), source)
    }
}

impl<R: Record, W: Write> RecordSink<R> for Recorder<R, W> {
    fn record(&mut self, record: &R) -> Result<()> {
        record
            .write_fields(&mut self.writer)
            .and_then(|()| self.writer.write_all(b"\n"))
            .map_err(|e| self.error(e))?;
        self.lines += 1;
        Ok(())
    }
}

/// `f1_percent \t f2_percent \t payoff`; an undefined payoff prints as `nan`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PayoffRecord {
    pub f1_percent: u32,
    pub f2_percent: u32,
    pub payoff: Option<f64>,
}

impl Record for PayoffRecord {
    fn write_fields<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{}\t{}\t", self.f1_percent, self.f2_percent)?;
        match self.payoff {
            Some(value) if !value.is_nan() => write!(out, "{value}"),
            _ => out.write_all(b"nan"),
        }
    }
}

/// The winning strategy of one search round, `fa \t fb \t fc`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WinnerRecord {
    pub strategy: [f64; 3],
}

impl Record for WinnerRecord {
    fn write_fields<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let [a, b, c] = self.strategy;
        write!(out, "{a}\t{b}\t{c}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row(u8);

    impl Record for Row {
        const HEADER: Option<&'static str> = Some("n");

        fn write_fields<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
            write!(out, "{}", self.0)
        }
    }

    fn render<R: Record>(records: &[R]) -> String {
        let mut buf = Vec::new();
        let mut recorder = Recorder::<R, _>::from_writer(&mut buf).unwrap();
        for record in records {
            recorder.record(record).unwrap();
        }
        assert_eq!(recorder.finish().unwrap(), records.len());
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn payoff_records_are_tab_separated() {
        let text = render(&[
            PayoffRecord {
                f1_percent: 1,
                f2_percent: 2,
                payoff: Some(-0.25),
            },
            PayoffRecord {
                f1_percent: 1,
                f2_percent: 3,
                payoff: None,
            },
        ]);
        assert_eq!(text, "1\t2\t-0.25\n1\t3\tnan\n");
        let columns: Vec<f64> = text
            .lines()
            .next()
            .unwrap()
            .split('\t')
            .map(|v| v.parse().unwrap())
            .collect();
        assert_eq!(columns, [1.0, 2.0, -0.25]);
    }

    #[test]
    fn winner_records_print_grid_values() {
        let text = render(&[WinnerRecord {
            strategy: [0.07, 1.0, 0.0],
        }]);
        assert_eq!(text, "0.07\t1\t0\n");
    }

    #[test]
    fn header_precedes_records_and_is_not_counted() {
        assert_eq!(render(&[Row(4), Row(5)]), "n\n4\n5\n");
        assert_eq!(render::<Row>(&[]), "n\n");
    }

    #[test]
    fn file_recorder_writes_on_finish() {
        let path = std::env::temp_dir().join(format!("lysis-recorder-{}", std::process::id()));
        let mut recorder = Recorder::<WinnerRecord>::create(&path).unwrap();
        recorder
            .record(&WinnerRecord {
                strategy: [0.5, 0.25, 0.75],
            })
            .unwrap();
        assert_eq!(recorder.lines(), 1);
        assert_eq!(recorder.finish().unwrap(), 1);
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(text, "0.5\t0.25\t0.75\n");
    }

    #[test]
    fn missing_directory_reports_the_path() {
        let err = Recorder::<WinnerRecord>::create("/nonexistent-dir/moi_winners_v_time")
            .err()
            .unwrap();
        assert!(err.to_string().contains("/nonexistent-dir/moi_winners_v_time"));
    }

    #[test]
    fn vectors_collect_records() {
        let mut sink: Vec<WinnerRecord> = Vec::new();
        sink.record(&WinnerRecord { strategy: [0.1; 3] }).unwrap();
        assert_eq!(sink.len(), 1);
    }
}
