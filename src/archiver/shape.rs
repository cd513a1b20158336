//! Calling shapes of the archiving library and the probe that picks one.
//!
//! The library's constructor and `compute_updates` signatures changed across
//! releases. Each known combination is a closed variant here; the probe maps
//! the interface a library *declares* through its descriptor onto exactly one
//! of them, and refuses anything it does not recognise.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::archiver::library::{ComputeReturn, LibraryDescriptor};
use crate::core::errors::{HarnessError, Result};

/// Constructor keyword sets seen across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConstructorShape {
    /// `{parseHTML}`
    Oldest,
    /// `{generator?, parse_html, ignore_body}`
    Transitional,
    /// `{generator?, parse_html}`
    Current,
}

/// `compute_updates` parameter lists seen across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComputeShape {
    /// `(args, lid, private, msg, raw_msg)`, four values returned.
    Current,
    /// `(lid, private, msg, raw_msg)`, four values returned.
    Interim,
    /// `(args, lid, private, msg)`, four values returned.
    ArgsOnly,
    /// `(lid, private, msg)`, two or four values returned.
    Legacy,
}

/// How a generator selection reaches the library instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeneratorChannel {
    /// `generator=` constructor keyword.
    Keyword,
    /// Library-level selector set alongside construction.
    Selector,
    /// The library cannot be told which generator to use.
    Unavailable,
}

/// The resolved interface of one library. Immutable once probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallingShape {
    pub constructor: ConstructorShape,
    pub compute: ComputeShape,
    pub generator: GeneratorChannel,
}

/// Where the calling shape comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShapeSelection {
    /// Ask the library's descriptor.
    #[default]
    Auto,
    /// Use this shape without probing.
    Fixed(CallingShape),
}

impl ConstructorShape {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Oldest => "oldest",
            Self::Transitional => "transitional",
            Self::Current => "current",
        }
    }

    /// Channel used when nothing more specific is configured.
    #[must_use]
    pub const fn default_channel(self) -> GeneratorChannel {
        match self {
            Self::Oldest => GeneratorChannel::Selector,
            Self::Transitional | Self::Current => GeneratorChannel::Keyword,
        }
    }
}

impl ComputeShape {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Interim => "interim",
            Self::ArgsOnly => "args-only",
            Self::Legacy => "legacy",
        }
    }

    /// Declared parameter list, `self` excluded.
    #[must_use]
    pub const fn parameters(self) -> &'static [&'static str] {
        match self {
            Self::Current => &["args", "lid", "private", "msg", "raw_msg"],
            Self::Interim => &["lid", "private", "msg", "raw_msg"],
            Self::ArgsOnly => &["args", "lid", "private", "msg"],
            Self::Legacy => &["lid", "private", "msg"],
        }
    }

    /// Whether a return value of this arity is legal for the shape.
    #[must_use]
    pub fn accepts(self, ret: &ComputeReturn) -> bool {
        match self {
            Self::Legacy => true,
            Self::Current | Self::Interim | Self::ArgsOnly => {
                matches!(ret, ComputeReturn::Full { .. })
            }
        }
    }

    pub const ALL: [Self; 4] = [Self::Current, Self::Interim, Self::ArgsOnly, Self::Legacy];
}

impl GeneratorChannel {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Selector => "selector",
            Self::Unavailable => "none",
        }
    }
}

impl fmt::Display for CallingShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.constructor.name(),
            self.compute.name(),
            self.generator.name()
        )
    }
}

impl FromStr for ShapeSelection {
    type Err = HarnessError;

    /// `auto`, or `<constructor>/<compute>[/<channel>]`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        let unsupported = |why: String| HarnessError::UnsupportedLibraryShape { details: why };

        let parts: Vec<&str> = s.split('/').map(str::trim).collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(unsupported(format!(
                "expected 'auto' or '<constructor>/<compute>[/<channel>]', got '{s}'"
            )));
        }
        let constructor = match parts[0] {
            "oldest" => ConstructorShape::Oldest,
            "transitional" => ConstructorShape::Transitional,
            "current" => ConstructorShape::Current,
            other => return Err(unsupported(format!("unknown constructor shape '{other}'"))),
        };
        let compute = ComputeShape::ALL
            .into_iter()
            .find(|c| c.name() == parts[1])
            .ok_or_else(|| unsupported(format!("unknown compute shape '{}'", parts[1])))?;
        let generator = match parts.get(2).copied() {
            None => constructor.default_channel(),
            Some("keyword") => GeneratorChannel::Keyword,
            Some("selector") => GeneratorChannel::Selector,
            Some("none") => GeneratorChannel::Unavailable,
            Some(other) => return Err(unsupported(format!("unknown generator channel '{other}'"))),
        };
        if constructor == ConstructorShape::Oldest && generator == GeneratorChannel::Keyword {
            return Err(unsupported(
                "the oldest constructor has no generator keyword".to_string(),
            ));
        }
        Ok(Self::Fixed(CallingShape {
            constructor,
            compute,
            generator,
        }))
    }
}

/// Resolve the calling shape for a library.
pub fn resolve(selection: ShapeSelection, descriptor: &LibraryDescriptor) -> Result<CallingShape> {
    match selection {
        ShapeSelection::Fixed(shape) => Ok(shape),
        ShapeSelection::Auto => probe(descriptor),
    }
}

/// Classify a declared interface. Anything but an exact match is rejected.
pub fn probe(descriptor: &LibraryDescriptor) -> Result<CallingShape> {
    let keywords: BTreeSet<&str> = descriptor
        .constructor_keywords
        .iter()
        .map(String::as_str)
        .collect();
    let has_generator_kw = keywords.contains("generator");
    let base: BTreeSet<&str> = keywords
        .iter()
        .copied()
        .filter(|k| *k != "generator")
        .collect();

    let constructor = if keywords == BTreeSet::from(["parseHTML"]) {
        ConstructorShape::Oldest
    } else if base == BTreeSet::from(["parse_html", "ignore_body"]) {
        ConstructorShape::Transitional
    } else if base == BTreeSet::from(["parse_html"]) {
        ConstructorShape::Current
    } else {
        return Err(HarnessError::UnsupportedLibraryShape {
            details: format!(
                "constructor keywords {:?} match no known shape",
                descriptor.constructor_keywords
            ),
        });
    };

    let params: Vec<&str> = descriptor
        .compute_parameters
        .iter()
        .map(String::as_str)
        .skip_while(|p| *p == "self")
        .collect();
    let compute = ComputeShape::ALL
        .into_iter()
        .find(|c| c.parameters() == params.as_slice())
        .ok_or_else(|| HarnessError::UnsupportedLibraryShape {
            details: format!(
                "compute_updates parameters {:?} match no known shape",
                descriptor.compute_parameters
            ),
        })?;

    let generator = if has_generator_kw {
        GeneratorChannel::Keyword
    } else if descriptor.generator_selector {
        GeneratorChannel::Selector
    } else {
        GeneratorChannel::Unavailable
    };

    Ok(CallingShape {
        constructor,
        compute,
        generator,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(ctor: &[&str], compute: &[&str], selector: bool) -> LibraryDescriptor {
        LibraryDescriptor {
            constructor_keywords: ctor.iter().map(ToString::to_string).collect(),
            compute_parameters: compute.iter().map(ToString::to_string).collect(),
            generator_selector: selector,
            generators: vec!["medium".to_string()],
        }
    }

    #[test]
    fn probes_each_release_family() {
        let oldest = probe(&descriptor(&["parseHTML"], &["self", "lid", "private", "msg"], true)).unwrap();
        assert_eq!(oldest.constructor, ConstructorShape::Oldest);
        assert_eq!(oldest.compute, ComputeShape::Legacy);
        assert_eq!(oldest.generator, GeneratorChannel::Selector);

        let transitional = probe(&descriptor(
            &["generator", "parse_html", "ignore_body"],
            &["args", "lid", "private", "msg"],
            false,
        ))
        .unwrap();
        assert_eq!(transitional.constructor, ConstructorShape::Transitional);
        assert_eq!(transitional.compute, ComputeShape::ArgsOnly);
        assert_eq!(transitional.generator, GeneratorChannel::Keyword);

        let current = probe(&descriptor(
            &["generator", "parse_html"],
            &["args", "lid", "private", "msg", "raw_msg"],
            false,
        ))
        .unwrap();
        assert_eq!(current.constructor, ConstructorShape::Current);
        assert_eq!(current.compute, ComputeShape::Current);
    }

    #[test]
    fn interim_raw_msg_shape_without_args() {
        let shape = probe(&descriptor(
            &["parse_html"],
            &["lid", "private", "msg", "raw_msg"],
            false,
        ))
        .unwrap();
        assert_eq!(shape.compute, ComputeShape::Interim);
        assert_eq!(shape.generator, GeneratorChannel::Unavailable);
    }

    #[test]
    fn keyword_wins_over_selector() {
        let shape = probe(&descriptor(
            &["generator", "parse_html"],
            &["args", "lid", "private", "msg", "raw_msg"],
            true,
        ))
        .unwrap();
        assert_eq!(shape.generator, GeneratorChannel::Keyword);
    }

    #[test]
    fn unknown_interfaces_are_rejected() {
        let err = probe(&descriptor(&["parse_html", "turbo"], &["lid", "private", "msg"], false)).unwrap_err();
        assert_eq!(err.code(), "MAH-1101");

        let err = probe(&descriptor(&["parse_html"], &["msg", "lid"], false)).unwrap_err();
        assert_eq!(err.code(), "MAH-1101");
    }

    #[test]
    fn parses_selection_strings() {
        assert_eq!("auto".parse::<ShapeSelection>().unwrap(), ShapeSelection::Auto);
        let ShapeSelection::Fixed(shape) = "oldest/legacy".parse::<ShapeSelection>().unwrap() else {
            panic!("expected fixed shape");
        };
        assert_eq!(shape.generator, GeneratorChannel::Selector);
        assert_eq!(shape.to_string(), "oldest/legacy/selector");

        let ShapeSelection::Fixed(shape) = "current/args-only/none".parse::<ShapeSelection>().unwrap()
        else {
            panic!("expected fixed shape");
        };
        assert_eq!(shape.compute, ComputeShape::ArgsOnly);
        assert_eq!(shape.generator, GeneratorChannel::Unavailable);

        assert!("oldest/legacy/keyword".parse::<ShapeSelection>().is_err());
        assert!("current".parse::<ShapeSelection>().is_err());
        assert!("newest/current".parse::<ShapeSelection>().is_err());
    }

    #[test]
    fn fixed_selection_skips_probe() {
        let bogus = descriptor(&["nonsense"], &[], false);
        let selection: ShapeSelection = "current/current".parse().unwrap();
        assert!(resolve(selection, &bogus).is_ok());
        assert!(resolve(ShapeSelection::Auto, &bogus).is_err());
    }
}
