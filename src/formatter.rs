//! Turns the raw decoded token text into indented source.
//!
//! The decoder only hands a flat string across this boundary; anything that implements
//! [`SourceFormatter`] can be plugged into the parser. [`BlockFormatter`] is a line-based
//! re-indenter that understands the block keywords of the target language. [`RawFormatter`]
//! leaves the text untouched.

use log::trace;

/// How function bodies are indented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndentMode {
    /// Indent the body of every function.
    #[default]
    AllFunctions,
    /// Only indent bodies of functions nested inside another function.
    OnlyNestedFunctions,
    /// Never indent function bodies.
    Classic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub indent_width: usize,
    pub indent_mode: IndentMode,
    /// Put a blank line between top-level function/class blocks.
    pub separate_blocks: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            indent_width: 4,
            indent_mode: IndentMode::AllFunctions,
            separate_blocks: true,
        }
    }
}

impl FormatOptions {
    pub fn new() -> Self {
        FormatOptions::default()
    }

    pub fn indent_width(mut self, indent_width: usize) -> Self {
        self.indent_width = indent_width;
        self
    }

    pub fn indent_mode(mut self, indent_mode: IndentMode) -> Self {
        self.indent_mode = indent_mode;
        self
    }

    pub fn separate_blocks(mut self, separate_blocks: bool) -> Self {
        self.separate_blocks = separate_blocks;
        self
    }
}

/// Text-to-text pretty printer applied to the decoded output.
pub trait SourceFormatter: Send + Sync {
    fn format(&self, text: &str) -> String;
}

/// Passes the decoded text through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFormatter;

impl SourceFormatter for RawFormatter {
    fn format(&self, text: &str) -> String {
        text.to_owned()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlockFormatter {
    options: FormatOptions,
}

impl BlockFormatter {
    pub fn new(options: FormatOptions) -> Self {
        BlockFormatter { options }
    }

    pub fn options(&self) -> &FormatOptions {
        &self.options
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Function,
    Classdef,
    Section,
    Arguments,
    Switch,
    Opener,
    End,
    Else,
    Case,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Keyword> {
        Some(match word {
            "function" => Keyword::Function,
            "classdef" => Keyword::Classdef,
            "properties" | "methods" | "events" | "enumeration" => Keyword::Section,
            "arguments" => Keyword::Arguments,
            "switch" => Keyword::Switch,
            "if" | "for" | "parfor" | "while" | "try" | "spmd" => Keyword::Opener,
            "end" => Keyword::End,
            "else" | "elseif" | "catch" => Keyword::Else,
            "case" | "otherwise" => Keyword::Case,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Function { nested: bool, terminated: bool },
    Classdef,
    Section,
    Switch,
    Other,
}

impl Block {
    fn indent(self, mode: IndentMode) -> usize {
        match self {
            Block::Function { nested, .. } => match mode {
                IndentMode::AllFunctions => 1,
                IndentMode::OnlyNestedFunctions if nested => 1,
                IndentMode::OnlyNestedFunctions | IndentMode::Classic => 0,
            },
            Block::Switch => 2,
            Block::Classdef | Block::Section | Block::Other => 1,
        }
    }
}

/// Keywords that start a statement on `line`, in order.
///
/// Skips string literals, bracketed expressions (so `x(end)` is not a block end) and comments.
fn statement_keywords(line: &str) -> Vec<Keyword> {
    let bytes = line.as_bytes();
    let mut keywords = Vec::new();
    let mut depth = 0_usize;
    let mut at_statement_start = true;
    let mut prev: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'%' => break,
            b' ' | b'\t' => {}
            b';' | b',' if depth == 0 => at_statement_start = true,
            b'(' | b'[' | b'{' => {
                depth += 1;
                at_statement_start = false;
            }
            b')' | b']' | b'}' => {
                depth = depth.saturating_sub(1);
                at_statement_start = false;
            }
            b'"' => {
                i = skip_string(bytes, i, b'"');
                at_statement_start = false;
            }
            b'\'' if !prev.is_some_and(is_transpose_operand) => {
                i = skip_string(bytes, i, b'\'');
                at_statement_start = false;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = i;
                while bytes
                    .get(i + 1)
                    .is_some_and(|&b| b.is_ascii_alphanumeric() || b == b'_')
                {
                    i += 1;
                }
                if at_statement_start && depth == 0 {
                    if let Some(keyword) = Keyword::from_word(&line[start..=i]) {
                        keywords.push(keyword);
                    }
                }
                at_statement_start = false;
            }
            _ => at_statement_start = false,
        }
        prev = Some(bytes[i]);
        i += 1;
    }

    keywords
}

/// A `'` directly after one of these is the transpose operator, not a string.
fn is_transpose_operand(c: u8) -> bool {
    c.is_ascii_alphanumeric() || b"_)]}'.".contains(&c)
}

/// Returns the index of the closing quote (or the last byte if unterminated).
fn skip_string(bytes: &[u8], open: usize, quote: u8) -> usize {
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            // Doubled quotes are an escaped quote.
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i;
        }
        i += 1;
    }
    bytes.len() - 1
}

fn is_continued(line: &str) -> bool {
    line.ends_with("...")
}

struct Indenter {
    mode: IndentMode,
    stack: Vec<Block>,
    functions_have_end: bool,
}

impl Indenter {
    fn level(&self) -> usize {
        self.stack.iter().map(|b| b.indent(self.mode)).sum()
    }

    fn in_function(&self) -> bool {
        self.stack
            .iter()
            .any(|b| matches!(b, Block::Function { .. }))
    }

    fn top(&self) -> Option<Block> {
        self.stack.last().copied()
    }

    /// A new function or class starts at the outermost level.
    fn at_top_level(&self) -> bool {
        self.stack.iter().all(|b| {
            matches!(
                b,
                Block::Function {
                    terminated: false,
                    ..
                }
            )
        })
    }

    fn close(&mut self) {
        match self.top() {
            Some(Block::Function {
                terminated: false, ..
            })
            | None => {}
            Some(_) => {
                self.stack.pop();
            }
        }
    }

    fn open(&mut self, keyword: Keyword) {
        let block = match keyword {
            Keyword::Function => {
                if !self.functions_have_end {
                    // Without `end`s, every function runs until the next one.
                    self.stack.clear();
                }
                Block::Function {
                    nested: self.in_function(),
                    terminated: self.functions_have_end,
                }
            }
            Keyword::Classdef => Block::Classdef,
            Keyword::Section if self.top() == Some(Block::Classdef) => Block::Section,
            Keyword::Arguments if self.in_function() => Block::Other,
            Keyword::Switch => Block::Switch,
            Keyword::Opener => Block::Other,
            _ => return,
        };
        self.stack.push(block);
    }

    /// Returns the indentation level of `keywords`' line and updates the block stack.
    fn apply(&mut self, keywords: &[Keyword]) -> usize {
        let mut rest = keywords;
        let level = match keywords.first() {
            Some(Keyword::End) => {
                self.close();
                rest = &keywords[1..];
                self.level()
            }
            Some(Keyword::Function) if !self.functions_have_end => {
                self.stack.clear();
                self.level()
            }
            Some(Keyword::Else) | Some(Keyword::Case) => self.level().saturating_sub(1),
            _ => self.level(),
        };

        for &keyword in rest {
            match keyword {
                Keyword::End => self.close(),
                _ => self.open(keyword),
            }
        }

        level
    }
}

/// `true` if every block opener, functions included, is matched by an `end`.
fn functions_have_end(lines: &[(&str, Vec<Keyword>)]) -> bool {
    let mut openers = 0_usize;
    let mut ends = 0_usize;
    let mut in_class = false;

    for keyword in lines.iter().flat_map(|(_, k)| k.iter()) {
        match keyword {
            Keyword::End => ends += 1,
            Keyword::Classdef => {
                in_class = true;
                openers += 1;
            }
            Keyword::Section if in_class => openers += 1,
            Keyword::Function | Keyword::Switch | Keyword::Opener => openers += 1,
            _ => {}
        }
    }

    ends >= openers
}

impl SourceFormatter for BlockFormatter {
    fn format(&self, text: &str) -> String {
        let lines: Vec<(&str, Vec<Keyword>)> = text
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| (line, statement_keywords(line)))
            .collect();

        let mut indenter = Indenter {
            mode: self.options.indent_mode,
            stack: Vec::new(),
            functions_have_end: functions_have_end(&lines),
        };
        trace!(
            "Formatting {} lines (functions terminated by end: {})",
            lines.len(),
            indenter.functions_have_end
        );

        let mut out = String::with_capacity(text.len() + text.len() / 2);
        let mut continued = false;

        for (line, keywords) in &lines {
            let starts_unit = matches!(
                keywords.first(),
                Some(Keyword::Function) | Some(Keyword::Classdef)
            ) && indenter.at_top_level();

            if continued {
                let level = indenter.level() + 1;
                push_line(&mut out, line, level * self.options.indent_width);
                continued = is_continued(line);
                continue;
            }

            if self.options.separate_blocks && starts_unit && !out.is_empty() {
                out.push('\n');
            }

            let level = indenter.apply(keywords);
            push_line(&mut out, line, level * self.options.indent_width);
            continued = is_continued(line);
        }

        if out.is_empty() {
            out.push('\n');
        }
        out
    }
}

fn push_line(out: &mut String, line: &str, indent: usize) {
    out.extend(std::iter::repeat_n(' ', indent));
    out.push_str(line);
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn format(text: &str, options: FormatOptions) -> String {
        BlockFormatter::new(options).format(text)
    }

    #[test]
    fn test_indents_nested_blocks() {
        let raw = "function y=f(x)\n if x>0\n y=x; \nelse \ny=-x; \nend\n end\n";
        let expected = "\
function y=f(x)
    if x>0
        y=x;
    else
        y=-x;
    end
end
";
        assert_eq!(format(raw, FormatOptions::default()), expected);
    }

    #[test]
    fn test_switch_cases() {
        let raw = "switch k\ncase 1\na=1; \notherwise\na=2; \nend\n";
        let expected = "\
switch k
    case 1
        a=1;
    otherwise
        a=2;
end
";
        assert_eq!(format(raw, FormatOptions::default()), expected);
    }

    #[test]
    fn test_separates_top_level_functions() {
        let raw = "function a\nx=1; \nend\nfunction b\ny=2; \nend\n";
        let expected = "\
function a
    x=1;
end

function b
    y=2;
end
";
        assert_eq!(format(raw, FormatOptions::default()), expected);

        let expected_compact = "\
function a
x=1;
end
function b
y=2;
end
";
        let options = FormatOptions::new()
            .indent_mode(IndentMode::Classic)
            .separate_blocks(false);
        assert_eq!(format(raw, options), expected_compact);
    }

    #[test]
    fn test_only_nested_functions_mode() {
        let raw = "function outer\nfunction inner\nz=3; \nend\nq=1; \nend\n";
        let expected = "\
function outer
function inner
    z=3;
end
q=1;
end
";
        let options = FormatOptions::new().indent_mode(IndentMode::OnlyNestedFunctions);
        assert_eq!(format(raw, options), expected);
    }

    #[test]
    fn test_functions_without_end() {
        let raw = "function a\nif x\ny=1; \nend\nfunction b\nz=2; \n";
        let expected = "\
function a
  if x
    y=1;
  end

function b
  z=2;
";
        let options = FormatOptions::new().indent_width(2);
        assert_eq!(format(raw, options), expected);
    }

    #[test]
    fn test_end_inside_index_and_strings_is_ignored() {
        let raw = "for i=1:3\nv=x(end); \ns='if end'; \nend\n";
        let expected = "\
for i=1:3
    v=x(end);
    s='if end';
end
";
        assert_eq!(format(raw, FormatOptions::default()), expected);
    }

    #[test]
    fn test_one_line_blocks_do_not_change_level() {
        let raw = "if a, b=1; end\nc=2; \n";
        assert_eq!(format(raw, FormatOptions::default()), "if a, b=1; end\nc=2;\n");
    }

    #[test]
    fn test_continuation_lines() {
        let raw = "while true\nx=a+...\n    b; \nend\n";
        let expected = "\
while true
    x=a+...
        b;
end
";
        assert_eq!(format(raw, FormatOptions::default()), expected);
    }

    #[test]
    fn test_classdef_sections() {
        let raw = "classdef C\nproperties\np\nend\nmethods\nfunction m(o)\nend\nend\nend\n";
        let expected = "\
classdef C
    properties
        p
    end
    methods
        function m(o)
        end
    end
end
";
        assert_eq!(format(raw, FormatOptions::default()), expected);
    }

    #[test]
    fn test_raw_formatter_is_identity() {
        let raw = "x=1; \n\n y";
        assert_eq!(RawFormatter.format(raw), raw);
    }

    #[test]
    fn test_blank_input_is_a_single_newline() {
        assert_eq!(format("", FormatOptions::default()), "\n");
        assert_eq!(format("   \n\n ", FormatOptions::default()), "\n");
    }
}
