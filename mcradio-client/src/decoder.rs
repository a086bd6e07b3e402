//! Payload sinks
//!
//! Payload bytes of the selected channel are written, in arrival order and
//! without reframing, either to an external decoder's stdin or to any
//! `Write` implementation (stdout for `--raw`).

use std::io::{self, Write};
use std::process::{Child, ChildStdin, Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Consumer of demultiplexed payload bytes
pub trait PayloadSink {
    fn write_payload(&mut self, payload: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// External decoder fed through its stdin
///
/// Dropping the sink closes the pipe and waits for the process to exit.
#[derive(Debug)]
pub struct DecoderProcess {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl DecoderProcess {
    /// Spawn a whitespace-separated command line such as `mpg123 -q -`
    pub fn spawn(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("decoder command is empty".to_string()))?;

        let mut command = Command::new(program);
        command.args(parts);
        Self::from_command(command)
    }

    /// Spawn a prepared command with its stdin piped
    pub fn from_command(mut command: Command) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Decoder(format!("failed to start {:?}: {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Decoder("decoder stdin was not captured".to_string()))?;

        info!("Decoder started (pid {})", child.id());
        Ok(Self {
            child,
            stdin: Some(stdin),
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Close the decoder's stdin and wait for it to finish
    pub fn finish(mut self) -> io::Result<std::process::ExitStatus> {
        self.close_and_wait()
    }

    fn close_and_wait(&mut self) -> io::Result<std::process::ExitStatus> {
        drop(self.stdin.take());
        let status = self.child.wait()?;
        debug!("Decoder exited with {}", status);
        Ok(status)
    }
}

impl PayloadSink for DecoderProcess {
    fn write_payload(&mut self, payload: &[u8]) -> io::Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(payload),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "decoder stdin already closed",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => stdin.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for DecoderProcess {
    fn drop(&mut self) {
        if self.stdin.is_none() {
            return;
        }
        if let Err(e) = self.close_and_wait() {
            warn!("Failed to wait for decoder: {}", e);
        }
    }
}

/// Sink writing payload straight to a writer
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PayloadSink for WriterSink<W> {
    fn write_payload(&mut self, payload: &[u8]) -> io::Result<()> {
        self.writer.write_all(payload)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_sink_appends() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write_payload(b"abc").unwrap();
        sink.write_payload(b"").unwrap();
        sink.write_payload(b"de").unwrap();
        assert_eq!(sink.into_inner(), b"abcde");
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(DecoderProcess::spawn("  "), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_program_rejected() {
        assert!(matches!(
            DecoderProcess::spawn("mcradio-no-such-decoder -q -"),
            Err(Error::Decoder(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_decoder_receives_payload_in_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("decoded");

        let mut command = Command::new("sh");
        command.arg("-c").arg(format!("cat > '{}'", out.display()));
        let mut decoder = DecoderProcess::from_command(command).unwrap();

        decoder.write_payload(b"first ").unwrap();
        decoder.write_payload(b"second").unwrap();
        assert!(decoder.finish().unwrap().success());

        assert_eq!(std::fs::read(&out).unwrap(), b"first second");
    }
}
