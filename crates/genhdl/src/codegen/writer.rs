//! A small indentation-tracking string builder, grounded on
//! `python2verilog/utils.py`'s `StringBuffer`/`ListBuffer`/`indentify`: both
//! accumulate lines and only apply indentation once, at render time, rather
//! than have every call site compute its own leading whitespace.

const INDENT_UNIT: &str = "    ";

/// Accumulates HDL source line by line, tracking indentation depth so call
/// sites just open/close blocks instead of threading whitespace around.
#[derive(Debug, Default)]
pub struct Writer {
    indent: usize,
    lines: Vec<String>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one line at the current indentation depth.
    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.lines.push(format!("{}{}", INDENT_UNIT.repeat(self.indent), text.as_ref()));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    pub fn indent(&mut self) -> &mut Self {
        self.indent += 1;
        self
    }

    pub fn dedent(&mut self) -> &mut Self {
        self.indent = self.indent.saturating_sub(1);
        self
    }

    /// Emits `open`, runs `body` one indent level deeper, then emits `close`
    /// back at the original depth — the shape every `begin`/`end`,
    /// `case`/`endcase`, and `module`/`endmodule` pair in this crate uses.
    pub fn block(&mut self, open: impl AsRef<str>, body: impl FnOnce(&mut Self), close: impl AsRef<str>) -> &mut Self {
        self.line(open);
        self.indent();
        body(self);
        self.dedent();
        self.line(close)
    }

    pub fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_blocks_indent_by_unit() {
        let mut w = Writer::new();
        w.block(
            "begin",
            |w| {
                w.line("a <= b;");
                w.block("if (c) begin", |w| { w.line("d <= e;"); }, "end");
            },
            "end",
        );
        let rendered = w.finish();
        assert_eq!(
            rendered,
            "begin\n    a <= b;\n    if (c) begin\n        d <= e;\n    end\nend\n"
        );
    }
}
