// Command log: the text file of turtle commands and annotations a run
// produces.
//
// Lines starting with a tab followed by a command word (`draw(`, `save()`,
// `plantnr(`, `finish(`, ...) are executed by the rendering host; lines
// starting with `#` are annotations (stage markers, plant parameters, the
// pending-rule and selection traces). The log is opened once per run and
// closed after the last plant; closing writes a final newline and flushes.
//
// Write failures are fatal (`LsysError::LogWrite`) and never retried.
//
// `MemorySink` is an in-memory writer for tests and for callers that want
// the log as a string.

use crate::error::LsysError;
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

/// Leading command words (first four letters) a rendering host recognizes.
pub const COMMAND_PREFIXES: [&str; 12] = [
    "para", "plan", "clas", "fini", "draw", "move", "turn", "pitc", "roll", "look", "save", "rest",
];

/// Whether `line` is an executable command line rather than an annotation.
pub fn is_command_line(line: &str) -> bool {
    let Some(body) = line.strip_prefix('\t') else {
        return false;
    };
    COMMAND_PREFIXES.iter().any(|prefix| body.starts_with(prefix))
}

/// The run's output sink.
pub struct CommandLog {
    sink: Option<Box<dyn Write>>,
}

impl CommandLog {
    /// Create (truncate) the log file at `path`.
    pub fn create(path: &Path) -> Result<Self, LsysError> {
        let file = File::create(path).map_err(|source| LsysError::LogOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    pub fn from_writer<W: Write + 'static>(writer: W) -> Self {
        Self {
            sink: Some(Box::new(writer)),
        }
    }

    /// Write `text` followed by a newline.
    pub fn write_line(&mut self, text: &str) -> Result<(), LsysError> {
        let sink = self.sink.as_mut().ok_or(LsysError::LogClosed)?;
        sink.write_all(text.as_bytes())?;
        sink.write_all(b"\n")?;
        Ok(())
    }

    /// Write `text` verbatim.
    pub fn write_raw(&mut self, text: &str) -> Result<(), LsysError> {
        let sink = self.sink.as_mut().ok_or(LsysError::LogClosed)?;
        sink.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Write the closing newline, flush and release the sink. Closing twice
    /// is a no-op.
    pub fn close(&mut self) -> Result<(), LsysError> {
        if let Some(mut sink) = self.sink.take() {
            sink.write_all(b"\n")?;
            sink.flush()?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }
}

impl std::fmt::Debug for CommandLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandLog")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A shareable in-memory writer. Clones share one buffer.
#[derive(Clone, Debug, Default)]
pub struct MemorySink(Rc<RefCell<Vec<u8>>>);

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_closes_once() {
        let sink = MemorySink::new();
        let mut log = CommandLog::from_writer(sink.clone());
        log.write_line("# seed: 1").unwrap();
        log.write_raw("\tfinish(1)\n").unwrap();
        log.close().unwrap();
        log.close().unwrap();
        assert!(log.is_closed());
        assert_eq!(sink.contents(), "# seed: 1\n\tfinish(1)\n\n");
    }

    #[test]
    fn writing_after_close_fails() {
        let mut log = CommandLog::from_writer(MemorySink::new());
        log.close().unwrap();
        assert!(matches!(log.write_line("x"), Err(LsysError::LogClosed)));
    }

    #[test]
    fn create_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no_such_dir").join("out.cmds");
        let err = CommandLog::create(&missing).unwrap_err();
        assert!(matches!(err, LsysError::LogOpen { ref path, .. } if path == &missing));
    }

    #[test]
    fn create_writes_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.cmds");
        let mut log = CommandLog::create(&path).unwrap();
        log.write_line("\tplantnr(1)\t# Start").unwrap();
        log.close().unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "\tplantnr(1)\t# Start\n\n"
        );
    }

    #[test]
    fn command_lines_are_recognized() {
        assert!(is_command_line("\tdraw(length=1.0000,width=0.1000)   #'F' : Stalk Draw"));
        assert!(is_command_line("\tplantnr(3)\t# Start"));
        assert!(is_command_line("\trestore()"));
        assert!(!is_command_line("#->\t(Grain)"));
        assert!(!is_command_line("draw(length=1.0000,width=0.1000)"));
        assert!(!is_command_line("\tgrow()"));
    }
}
