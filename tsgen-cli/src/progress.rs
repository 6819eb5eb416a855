use std::io::Write;

use tsgen_engine::ProgressSink;

/// `\r`-rewritten step counter on stderr.
pub struct ConsoleProgress<W: Write> {
    out: W,
    label: String,
    every: usize,
}

impl ConsoleProgress<std::io::Stderr> {
    pub fn stderr(label: impl Into<String>, total: usize) -> Self {
        Self::new(std::io::stderr(), label, total)
    }
}

impl<W: Write> ConsoleProgress<W> {
    pub fn new(out: W, label: impl Into<String>, total: usize) -> Self {
        // Redraw roughly two hundred times per run at most.
        let every = (total / 200).max(1);
        Self {
            out,
            label: label.into(),
            every,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ProgressSink for ConsoleProgress<W> {
    fn report(&mut self, completed: usize, total: usize) {
        if completed % self.every != 0 && completed != total {
            return;
        }
        // Best-effort.
        let _ = write!(self.out, "\r{}: {completed}/{total}", self.label);
        if completed == total {
            let _ = writeln!(self.out);
        }
        let _ = self.out.flush();
    }
}
