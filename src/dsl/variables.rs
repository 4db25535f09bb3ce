//! Textual variable environments for compound-class formals.

/// A stack of `$formal` to actual-argument bindings, each tagged with
/// the nesting depth of the compound that introduced it. Bindings are
/// stored flat; a "frame" is just the run of entries sharing a depth.
#[derive(Debug, Clone, Default)]
pub struct VariableEnvironment {
    /// Formal names with their `$` sigil, as lexed.
    formals: Vec<String>,
    values: Vec<String>,
    depths: Vec<i32>,
}

impl VariableEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every binding of `other`.
    pub fn enter(&mut self, other: &VariableEnvironment) {
        self.formals.extend_from_slice(&other.formals);
        self.values.extend_from_slice(&other.values);
        self.depths.extend_from_slice(&other.depths);
    }

    /// Push one frame of bindings at `depth`.
    pub fn enter_frame(&mut self, formals: &[String], values: &[String], depth: i32) {
        for (formal, value) in formals.iter().zip(values) {
            self.formals.push(formal.clone());
            self.values.push(value.clone());
            self.depths.push(depth);
        }
    }

    /// Drop bindings introduced at `depth` or deeper. Depths are
    /// non-decreasing, so this truncates a suffix; it models the textual
    /// scoping of formals across nested compounds.
    pub fn limit_depth(&mut self, depth: i32) {
        let keep = self
            .depths
            .iter()
            .position(|&d| d >= depth)
            .unwrap_or(self.depths.len());
        self.formals.truncate(keep);
        self.values.truncate(keep);
        self.depths.truncate(keep);
    }

    /// Depth of the newest binding, or -1 when empty.
    pub fn depth(&self) -> i32 {
        self.depths.last().copied().unwrap_or(-1)
    }

    /// Substitute `$name` bindings into `text`.
    ///
    /// The newest binding wins, `$$` is a literal `$`, `\$` is copied
    /// through untouched, and unknown names stay as written. This is
    /// purely textual; no expression language is involved.
    pub fn interpolate(&self, text: &str) -> String {
        let bytes = text.as_bytes();
        let mut out = String::with_capacity(text.len());
        let mut pos = 0;
        while pos < bytes.len() {
            match bytes[pos] {
                b'\\' if pos + 1 < bytes.len() && bytes[pos + 1] == b'$' => {
                    out.push_str("\\$");
                    pos += 2;
                }
                b'$' => {
                    if pos + 1 < bytes.len() && bytes[pos + 1] == b'$' {
                        out.push('$');
                        pos += 2;
                        continue;
                    }
                    let mut end = pos + 1;
                    while end < bytes.len()
                        && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                    {
                        end += 1;
                    }
                    if end == pos + 1 {
                        out.push('$');
                        pos += 1;
                        continue;
                    }
                    let name = &text[pos..end];
                    match self.formals.iter().rposition(|formal| formal == name) {
                        Some(i) => out.push_str(&self.values[i]),
                        None => out.push_str(name),
                    }
                    pos = end;
                }
                _ => {
                    let start = pos;
                    while pos < bytes.len()
                        && bytes[pos] != b'$'
                        && !(bytes[pos] == b'\\'
                            && pos + 1 < bytes.len()
                            && bytes[pos + 1] == b'$')
                    {
                        pos += 1;
                    }
                    out.push_str(&text[start..pos]);
                }
            }
        }
        out
    }
}
