//! Loader for the LS-8 program text format: one 8-bit base-2 literal per
//! line, `#` starts a comment, blank lines are skipped.
//!
//! ```text
//! 10000010 # LDI R0,8
//! 00000000
//! 00001000
//! 01000111 # PRN R0
//! 00000000
//! 00000001 # HLT
//! ```

use std::borrow::Cow;
use std::error;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::{fmt, str::Lines};

use color_eyre::eyre::{eyre, WrapErr};

use super::{Byte, Memory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    InvalidAddress { address: usize },
    InvalidNumber { radix: u32 },
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::InvalidAddress { address } => {
                write!(f, "memory has no address `0x{:x}`", address)
            }
            ParseErrorKind::InvalidNumber { radix } => {
                write!(f, "failed to parse number with radix `{}`", radix)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    kind: ParseErrorKind,
    context: Option<Cow<'static, str>>,
    line_nr: usize,
}

impl ParseError {
    fn new<C, S>(kind: ParseErrorKind, context: C, line_nr: usize) -> Self
    where
        C: Into<Option<S>>,
        S: Into<Cow<'static, str>>,
    {
        Self {
            kind,
            context: context.into().map(|inner| inner.into()),
            line_nr,
        }
    }

    pub fn line_nr(&self) -> usize {
        self.line_nr
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(
                f,
                "error [ln: {}]: {} - {}",
                self.line_nr, self.kind, context
            )
        } else {
            write!(f, "error [ln: {}]: {}", self.line_nr, self.kind)
        }
    }
}

impl error::Error for ParseError {}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;

#[derive(Debug, Clone)]
pub struct Parser<'a> {
    lines: Lines<'a>,
    line_nr: usize,
    image: Vec<Byte>,
}

impl<'a> Parser<'a> {
    /// Creates a new parser over `source` which will try to build a program
    /// image from it.
    pub fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            line_nr: 0,
            image: Vec::new(),
        }
    }

    /// Consumes `self` and tries to parse the whole source into a program
    /// image.
    ///
    /// # Errors
    ///
    /// All errors which may occur are collected and returned at the end.
    pub fn parse(mut self) -> Result<Vec<Byte>, Vec<ParseError>> {
        let mut errors = Vec::new();

        while let Some(res) = self.parse_next_line() {
            if let Err(err) = res {
                log::error!("{}", err);
                errors.push(err);
            }
        }

        if errors.is_empty() {
            Ok(self.image)
        } else {
            Err(errors)
        }
    }

    /// Tries to parse the next line of the source. Each line holds at most
    /// one instruction byte; a `#` starts a comment for the rest of the line.
    fn parse_next_line(&mut self) -> Option<Result<()>> {
        let line = self.lines.next()?;
        self.line_nr += 1;

        let token = match line.find('#') {
            Some(comment) => &line[..comment],
            None => line,
        }
        .trim();

        if token.is_empty() {
            // Comment or empty line; skip
            return Some(Ok(()));
        }

        match Byte::from_str_radix(token, 2) {
            Ok(byte) => {
                self.image.push(byte);
                Some(Ok(()))
            }
            Err(_) => Some(Err(ParseError::new(
                ParseErrorKind::InvalidNumber { radix: 2 },
                format!("`{}` is not an 8-bit binary literal", token),
                self.line_nr,
            ))),
        }
    }
}

impl<const S: usize> FromStr for Memory<S> {
    type Err = Vec<ParseError>;

    /// Parses a program source and loads the image at address 0.
    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let image = Parser::new(source).parse()?;

        let mut memory = Memory::default();
        memory.load_image(&image).map_err(|err| {
            vec![ParseError::new(
                ParseErrorKind::InvalidAddress {
                    address: err.address,
                },
                "program image does not fit into memory",
                0,
            )]
        })?;

        Ok(memory)
    }
}

impl<const S: usize> Memory<S> {
    /// Reads a program file and loads its image at address 0.
    pub fn from_file<P: AsRef<Path>>(path: P) -> color_eyre::eyre::Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read program `{}`", path.display()))?;

        source.parse().map_err(|errors: Vec<ParseError>| {
            eyre!(
                "{} error(s) while parsing program `{}`",
                errors.len(),
                path.display()
            )
        })
    }
}
