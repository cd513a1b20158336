//! Compatibility adapter: one call surface over every known calling shape.
//!
//! The adapter resolves the library's [`CallingShape`] once, builds exactly
//! one library instance with the keywords that shape accepts, and from then
//! on dispatches every `compute` through the strategy picked at
//! construction. Runners only ever see [`ComputeResult`].
//!
//! An adapter owns mutable library state; use one per generator and never
//! share it between concurrent callers.

#![allow(missing_docs)]

use crate::archiver::library::{
    ArchiverInstance, ArchiverLibrary, ComputeCall, ComputeResult, ConstructorCall,
    ConstructorKeywords, FakeArgs, LibraryDescriptor,
};
use crate::archiver::shape::{
    self, CallingShape, ComputeShape, ConstructorShape, GeneratorChannel, ShapeSelection,
};
use crate::core::errors::{HarnessError, Result};
use crate::corpus::message::RawMessage;

/// Per-adapter construction options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterOptions {
    /// Generator the instance should use; the library default when `None`.
    pub generator: Option<String>,
    pub parse_html: bool,
}

impl AdapterOptions {
    #[must_use]
    pub fn for_generator(generator: impl Into<String>) -> Self {
        Self {
            generator: Some(generator.into()),
            parse_html: false,
        }
    }
}

/// Uniform `compute` over one library instance.
pub struct ArchiverAdapter {
    shape: CallingShape,
    instance: Box<dyn ArchiverInstance>,
}

impl std::fmt::Debug for ArchiverAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiverAdapter")
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

impl ArchiverAdapter {
    /// Resolve the shape (probing the library unless `selection` fixes it)
    /// and build the instance.
    pub fn new(
        library: &mut dyn ArchiverLibrary,
        selection: ShapeSelection,
        options: &AdapterOptions,
    ) -> Result<Self> {
        let descriptor = match selection {
            ShapeSelection::Auto => library.describe()?,
            ShapeSelection::Fixed(_) => LibraryDescriptor::default(),
        };
        let shape = shape::resolve(selection, &descriptor)?;
        Self::with_shape(library, shape, options)
    }

    /// Build the instance for an already resolved shape.
    pub fn with_shape(
        library: &mut dyn ArchiverLibrary,
        shape: CallingShape,
        options: &AdapterOptions,
    ) -> Result<Self> {
        let call = constructor_call(shape, options)?;
        tracing::debug!(%shape, ?call, "constructing archiver instance");
        let instance = library.instantiate(&call)?;
        Ok(Self { shape, instance })
    }

    #[must_use]
    pub const fn shape(&self) -> CallingShape {
        self.shape
    }

    /// Run the archiver over one message.
    ///
    /// Returns `None` when the library produced no document for the message.
    pub fn compute(
        &mut self,
        args: &FakeArgs,
        list_id: &str,
        private: bool,
        message: &RawMessage<'_>,
        raw: &[u8],
    ) -> Result<Option<ComputeResult>> {
        let call = match self.shape.compute {
            ComputeShape::Current => ComputeCall::Current {
                args,
                list_id,
                private,
                message,
                raw,
            },
            ComputeShape::Interim => ComputeCall::Interim {
                list_id,
                private,
                message,
                raw,
            },
            ComputeShape::ArgsOnly => ComputeCall::ArgsOnly {
                args,
                list_id,
                private,
                message,
            },
            ComputeShape::Legacy => ComputeCall::Legacy {
                list_id,
                private,
                message,
            },
        };

        let ret = self.instance.compute_updates(call)?;
        if !self.shape.compute.accepts(&ret) {
            return Err(HarnessError::ShapeViolation {
                shape: self.shape.to_string(),
                got: format!("{} values", ret.arity()),
            });
        }
        Ok(ret.into_document())
    }
}

/// Pick the generator channel and the constructor keywords for `shape`.
fn constructor_call(shape: CallingShape, options: &AdapterOptions) -> Result<ConstructorCall> {
    let (keyword, selector) = match (&options.generator, shape.generator) {
        (None, _) => (None, None),
        (Some(name), GeneratorChannel::Keyword) => (Some(name.clone()), None),
        (Some(name), GeneratorChannel::Selector) => (None, Some(name.clone())),
        (Some(name), GeneratorChannel::Unavailable) => {
            return Err(HarnessError::UnsupportedLibraryShape {
                details: format!(
                    "generator '{name}' requested but shape {shape} has no generator channel"
                ),
            });
        }
    };

    let keywords = match shape.constructor {
        ConstructorShape::Oldest => ConstructorKeywords::Oldest {
            parse_html: options.parse_html,
        },
        ConstructorShape::Transitional => ConstructorKeywords::Transitional {
            generator: keyword,
            parse_html: options.parse_html,
            ignore_body: None,
        },
        ConstructorShape::Current => ConstructorKeywords::Current {
            generator: keyword,
            parse_html: options.parse_html,
        },
    };

    Ok(ConstructorCall {
        keywords,
        generator_selector: selector,
    })
}
