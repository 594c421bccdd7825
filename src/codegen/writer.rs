/// Line buffer with block indentation used by every backend.
#[derive(Debug, Default)]
pub struct SourceWriter {
    out: String,
    depth: usize,
    unit: &'static str,
}

impl SourceWriter {
    pub fn new(unit: &'static str) -> Self {
        SourceWriter {
            out: String::new(),
            depth: 0,
            unit,
        }
    }

    /// Writes one line at the current indentation.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(self.unit);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    /// Writes `text` and indents what follows.
    pub fn open(&mut self, text: impl AsRef<str>) {
        self.line(text);
        self.depth += 1;
    }

    /// Dedents and writes `text`.
    pub fn close(&mut self, text: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
    }

    /// Appends already indented text verbatim.
    pub fn raw(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_blocks() {
        let mut w = SourceWriter::new("    ");
        w.open("fn f() {");
        w.open("if x {");
        w.line("y();");
        w.close("}");
        w.blank();
        w.blank();
        w.close("}");
        assert_eq!(w.finish(), "fn f() {\n    if x {\n        y();\n    }\n\n}\n");
    }
}
