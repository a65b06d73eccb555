use tracing::debug;

/// Per-pass table of regions lifted out of the text, each keyed by an opaque
/// token. A vault is created for one render call and dropped with it.
pub(crate) struct PlaceholderVault<T> {
    make_token: fn(usize) -> String,
    slots: Vec<Slot<T>>,
}

/// Where a token occurrence sits in the markup being restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    Text,
    /// Between a tag's `<` and `>`, e.g. in an `href` or `title` value.
    Tag,
}

impl Placement {
    /// Restored text never carries a raw `<` or `>`, so the nearest bracket
    /// before `offset` tells whether it opened a tag.
    fn of(html: &str, offset: usize) -> Self {
        let before = &html[..offset];
        match (before.rfind('<'), before.rfind('>')) {
            (Some(open), Some(close)) if open > close => Placement::Tag,
            (Some(_), None) => Placement::Tag,
            _ => Placement::Text,
        }
    }
}

struct Slot<T> {
    token: String,
    value: T,
    consumed: bool,
}

impl<T> PlaceholderVault<T> {
    pub(crate) fn new(make_token: fn(usize) -> String) -> Self {
        Self {
            make_token,
            slots: Vec::new(),
        }
    }

    /// Record a region and return the token that now stands for it. The
    /// builder receives the token so values can carry it along.
    pub(crate) fn store_with(&mut self, build: impl FnOnce(String) -> T) -> String {
        let token = (self.make_token)(self.slots.len());
        let value = build(token.clone());
        self.slots.push(Slot {
            token: token.clone(),
            value,
            consumed: false,
        });
        token
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().map(|slot| &slot.value)
    }

    pub(crate) fn tokens(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.token.as_str())
    }

    /// Substitute every pending token, in recording order, at its first
    /// remaining occurrence. Regions whose token no longer occurs are dropped.
    pub(crate) fn restore(&mut self, html: String, mut render: impl FnMut(&T) -> String) -> String {
        self.restore_matching(html, |_| true, |value, _| render(value))
    }

    /// Like [`restore`](Self::restore), limited to the regions `selected`
    /// accepts; the rest stay pending. `render` learns whether the token sat
    /// in text or inside a tag.
    pub(crate) fn restore_matching(
        &mut self,
        mut html: String,
        mut selected: impl FnMut(&T) -> bool,
        mut render: impl FnMut(&T, Placement) -> String,
    ) -> String {
        for slot in self
            .slots
            .iter_mut()
            .filter(|slot| !slot.consumed && selected(&slot.value))
        {
            slot.consumed = true;
            match html.find(&slot.token) {
                Some(start) => {
                    let end = start + slot.token.len();
                    let replacement = render(&slot.value, Placement::of(&html, start));
                    html.replace_range(start..end, &replacement);
                }
                None => {
                    debug!(
                        target = "application::render::vault",
                        token = %slot.token.escape_debug(),
                        "placeholder vanished before restoration; region dropped"
                    );
                }
            }
        }
        html
    }

    /// Consume the pending region stored under `token`, if `accept` wants it.
    pub(crate) fn take(&mut self, token: &str, accept: impl FnOnce(&T) -> bool) -> Option<&T> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| !slot.consumed && slot.token == token)?;
        if !accept(&slot.value) {
            return None;
        }
        slot.consumed = true;
        Some(&slot.value)
    }
}
