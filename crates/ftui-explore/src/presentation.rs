#![forbid(unsafe_code)]

//! The capability an explored component must provide.
//!
//! Anything that turns a property bag into a view is a [`Presentation`]:
//! plain functions and closures through the blanket impl, and stateful
//! components by implementing the trait directly. The explorer never looks at
//! the view; it hands back whatever the unit produced.

use std::borrow::Cow;

use crate::props::Props;

/// A unit that renders a view from merged properties.
///
/// Implementations must tolerate keys they do not know about: the explorer
/// adds every derived key to the bag.
pub trait Presentation {
    type View;

    fn render(&self, props: &Props) -> Self::View;

    /// Name used when describing the explored wrapper.
    fn display_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("Component")
    }
}

impl<F, V> Presentation for F
where
    F: Fn(&Props) -> V,
{
    type View = V;

    fn render(&self, props: &Props) -> V {
        self(props)
    }
}

/// Attach a display name to a presentation unit, typically a closure.
#[derive(Debug, Clone)]
pub struct Named<U> {
    name: Cow<'static, str>,
    unit: U,
}

impl<U> Named<U> {
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, unit: U) -> Self {
        Self {
            name: name.into(),
            unit,
        }
    }

    #[must_use]
    pub fn inner(&self) -> &U {
        &self.unit
    }
}

impl<U: Presentation> Presentation for Named<U> {
    type View = U::View;

    fn render(&self, props: &Props) -> Self::View {
        self.unit.render(props)
    }

    fn display_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }
}
