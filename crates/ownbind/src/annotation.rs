//! Annotation directives attached to native declarations
//!
//! Directives are written next to the native declaration, usually inside a
//! `-#- ... -#-` comment:
//!
//! ```text
//! // -#- @foobar(custodian=-1); @return(caller_owns_return=true) -#-
//! // -#- incref_method=Ref; decref_method=Unref -#-
//! ```
//!
//! A directive list is split on `;`. Each entry is either a global
//! `key[=value]` pair or a targeted `@name(key=value, ...)` group, where
//! `name` is a parameter name or `return`.

use indexmap::IndexMap;

use crate::error::ModelError;
use crate::model::Direction;

/// Target name for return-value directives.
pub const RETURN_TARGET: &str = "return";

const COMMENT_MARKER: &str = "-#-";

/// Parsed, untyped directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    global: IndexMap<String, Option<String>>,
    targets: IndexMap<String, IndexMap<String, String>>,
}

/// Who is responsible for keeping a ward alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustodianRef {
    /// The value returned by the call (`custodian=-1`)
    Return,
    /// The instance the method is invoked on (`custodian=0`)
    Receiver,
    /// A parameter, zero-based (`custodian=N` names parameter `N-1`)
    Param(usize),
}

impl CustodianRef {
    /// Parse the numeric custodian notation.
    pub fn parse(value: &str) -> Result<Self, ModelError> {
        let n: i64 = value.trim().parse().map_err(|_| ModelError::BadAnnotation {
            directive: format!("custodian={}", value),
            reason: "custodian must be an integer".to_string(),
        })?;
        match n {
            -1 => Ok(CustodianRef::Return),
            0 => Ok(CustodianRef::Receiver),
            n if n > 0 => Ok(CustodianRef::Param(n as usize - 1)),
            _ => Err(ModelError::BadAnnotation {
                directive: format!("custodian={}", value),
                reason: "custodian must be -1, 0 or a parameter number".to_string(),
            }),
        }
    }
}

/// Typed directives for one parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamAnnotation {
    /// `transfer_ownership=`
    pub transfer_ownership: Option<bool>,
    /// `custodian=`
    pub custodian: Option<CustodianRef>,
    /// `direction=`
    pub direction: Option<Direction>,
}

impl ParamAnnotation {
    /// True when no ownership directive is present.
    pub fn is_silent(&self) -> bool {
        self.transfer_ownership.is_none() && self.custodian.is_none()
    }
}

/// Typed directives for the return value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReturnAnnotation {
    /// `caller_owns_return=`
    pub caller_owns_return: Option<bool>,
    /// `custodian=`
    pub custodian: Option<CustodianRef>,
}

impl ReturnAnnotation {
    /// True when no ownership directive is present.
    pub fn is_silent(&self) -> bool {
        self.caller_owns_return.is_none() && self.custodian.is_none()
    }
}

/// Declaration-level switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclOptions {
    /// `ignore`: do not wrap this declaration
    pub ignore: bool,
    /// `name=`: wrapper name to use instead of the native name
    pub name: Option<String>,
    /// `as_method=`: expose a free function as a method of `of_class`
    pub as_method: Option<String>,
    /// `of_class=`: the type `as_method` attaches to
    pub of_class: Option<String>,
}

/// Type-level switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassOptions {
    /// `incref_method=`
    pub incref_method: Option<String>,
    /// `decref_method=`
    pub decref_method: Option<String>,
    /// `peekref_method=`
    pub peekref_method: Option<String>,
    /// `is_singleton=`
    pub is_singleton: Option<bool>,
}

impl Directives {
    /// Parse a directive list.
    ///
    /// Surrounding `-#-` markers are tolerated so raw comment bodies can be
    /// passed through unchanged.
    pub fn parse(text: &str) -> Result<Self, ModelError> {
        let mut directives = Directives::default();
        let body = strip_markers(text);

        for entry in body.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            if let Some(rest) = entry.strip_prefix('@') {
                let (target, elements) = parse_targeted(entry, rest)?;
                directives.targets.entry(target).or_default().extend(elements);
            } else {
                let (key, value) = parse_pair(entry)?;
                directives.global.insert(key, value);
            }
        }

        Ok(directives)
    }

    /// Extract directives from a `// -#- ... -#-` or `/* -#- ... -#- */`
    /// comment line. Returns `None` if the line carries no directive.
    pub fn from_comment(line: &str) -> Option<Result<Self, ModelError>> {
        let trimmed = line.trim();
        let inner = trimmed
            .strip_prefix("//")
            .or_else(|| {
                trimmed
                    .strip_prefix("/*")
                    .map(|s| s.strip_suffix("*/").unwrap_or(s))
            })?
            .trim();
        if inner.starts_with(COMMENT_MARKER) && inner.ends_with(COMMENT_MARKER) {
            Some(Self::parse(inner))
        } else {
            None
        }
    }

    /// True when nothing was parsed.
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.targets.is_empty()
    }

    /// Names of all `@target(...)` groups, in order of appearance.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Raw global value lookup. `Some(None)` means a bare flag.
    pub fn global(&self, key: &str) -> Option<Option<&str>> {
        self.global.get(key).map(Option::as_deref)
    }

    /// Typed directives for parameter `name`.
    pub fn param(&self, name: &str) -> Result<ParamAnnotation, ModelError> {
        let mut annotation = ParamAnnotation::default();
        let Some(elements) = self.targets.get(name) else {
            return Ok(annotation);
        };

        for (key, value) in elements {
            match key.as_str() {
                "transfer_ownership" => {
                    annotation.transfer_ownership = Some(parse_boolean(value)?)
                }
                "custodian" => annotation.custodian = Some(CustodianRef::parse(value)?),
                "direction" => annotation.direction = Some(parse_direction(value)?),
                other => warn_unknown(other, name),
            }
        }

        Ok(annotation)
    }

    /// Typed directives for the return value.
    pub fn return_annotation(&self) -> Result<ReturnAnnotation, ModelError> {
        let mut annotation = ReturnAnnotation::default();
        let Some(elements) = self.targets.get(RETURN_TARGET) else {
            return Ok(annotation);
        };

        for (key, value) in elements {
            match key.as_str() {
                "caller_owns_return" => annotation.caller_owns_return = Some(parse_boolean(value)?),
                "custodian" => annotation.custodian = Some(CustodianRef::parse(value)?),
                other => warn_unknown(other, RETURN_TARGET),
            }
        }

        Ok(annotation)
    }

    /// Declaration-level switches.
    pub fn decl_options(&self) -> Result<DeclOptions, ModelError> {
        let mut options = DeclOptions::default();
        for (key, value) in &self.global {
            match key.as_str() {
                "ignore" => {
                    options.ignore = match value {
                        Some(v) => parse_boolean(v)?,
                        None => true,
                    }
                }
                "name" => options.name = Some(required(key, value)?),
                "as_method" => options.as_method = Some(required(key, value)?),
                "of_class" => options.of_class = Some(required(key, value)?),
                other => warn_unknown(other, "declaration"),
            }
        }
        if options.as_method.is_some() != options.of_class.is_some() {
            return Err(ModelError::BadAnnotation {
                directive: "as_method".to_string(),
                reason: "as_method and of_class must be given together".to_string(),
            });
        }
        Ok(options)
    }

    /// Type-level switches.
    pub fn class_options(&self) -> Result<ClassOptions, ModelError> {
        let mut options = ClassOptions::default();
        for (key, value) in &self.global {
            match key.as_str() {
                "incref_method" => options.incref_method = Some(required(key, value)?),
                "decref_method" => options.decref_method = Some(required(key, value)?),
                "peekref_method" => options.peekref_method = Some(required(key, value)?),
                "is_singleton" => {
                    options.is_singleton = Some(match value {
                        Some(v) => parse_boolean(v)?,
                        None => true,
                    })
                }
                other => warn_unknown(other, "type"),
            }
        }
        if !self.targets.is_empty() {
            return Err(ModelError::BadAnnotation {
                directive: format!("@{}", self.targets.keys().next().map_or("", String::as_str)),
                reason: "targeted directives are not allowed on types".to_string(),
            });
        }
        Ok(options)
    }
}

/// Parse an annotation boolean (`true`/`on`, `false`/`off`).
pub fn parse_boolean(value: &str) -> Result<bool, ModelError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" => Ok(true),
        "false" | "off" => Ok(false),
        _ => Err(ModelError::BadAnnotation {
            directive: value.to_string(),
            reason: "expected true/on or false/off".to_string(),
        }),
    }
}

fn parse_direction(value: &str) -> Result<Direction, ModelError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "in" => Ok(Direction::In),
        "out" => Ok(Direction::Out),
        "inout" => Ok(Direction::InOut),
        _ => Err(ModelError::BadAnnotation {
            directive: format!("direction={}", value),
            reason: "expected in, out or inout".to_string(),
        }),
    }
}

fn strip_markers(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix(COMMENT_MARKER).unwrap_or(trimmed);
    trimmed.strip_suffix(COMMENT_MARKER).unwrap_or(trimmed).trim()
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn parse_pair(entry: &str) -> Result<(String, Option<String>), ModelError> {
    let (key, value) = match entry.split_once('=') {
        Some((k, v)) => (k.trim(), Some(v.trim())),
        None => (entry.trim(), None),
    };
    if !is_word(key) {
        return Err(ModelError::BadAnnotation {
            directive: entry.to_string(),
            reason: "expected `key` or `key=value`".to_string(),
        });
    }
    if let Some(v) = value {
        if v.is_empty() || v.chars().any(char::is_whitespace) {
            return Err(ModelError::BadAnnotation {
                directive: entry.to_string(),
                reason: "value must be a single word".to_string(),
            });
        }
    }
    Ok((key.to_string(), value.map(str::to_string)))
}

fn parse_targeted(
    entry: &str,
    rest: &str,
) -> Result<(String, IndexMap<String, String>), ModelError> {
    let bad = |reason: &str| ModelError::BadAnnotation {
        directive: entry.to_string(),
        reason: reason.to_string(),
    };

    let (target, args) = rest
        .split_once('(')
        .ok_or_else(|| bad("expected `@name(key=value, ...)`"))?;
    let args = args
        .trim_end()
        .strip_suffix(')')
        .ok_or_else(|| bad("missing closing parenthesis"))?;
    let target = target.trim();
    if !is_word(target) {
        return Err(bad("target must be a parameter name or `return`"));
    }

    let mut elements = IndexMap::new();
    for element in args.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match parse_pair(element)? {
            (key, Some(value)) => {
                elements.insert(key, value);
            }
            (_, None) => return Err(bad("targeted directives need `key=value`")),
        }
    }
    if elements.is_empty() {
        return Err(bad("empty directive group"));
    }

    Ok((target.to_string(), elements))
}

fn required(key: &str, value: &Option<String>) -> Result<String, ModelError> {
    value.clone().ok_or_else(|| ModelError::BadAnnotation {
        directive: key.to_string(),
        reason: "a value is required".to_string(),
    })
}

fn warn_unknown(key: &str, target: &str) {
    tracing::warn!(key, target, "ignoring unknown annotation");
}
