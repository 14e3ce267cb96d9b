//! Attribute and class helpers
//!
//! Readers look at the first element of the selection; writers touch every
//! element and skip other node kinds. Names are folded with the context's
//! `lower_case_attribute_names` option.

use ahash::AHashSet;

use crate::selection::Selection;
use crate::types::ElementData;

impl Selection {
    /// Apply `f` to every element of the selection
    fn for_each_element<F>(&self, mut f: F)
    where
        F: FnMut(&mut ElementData),
    {
        let mut arena = self.context().arena_mut();
        for &id in self.nodes() {
            if let Some(element) = arena.node_mut(id).and_then(|n| n.as_element_mut()) {
                f(element);
            }
        }
    }

    /// Attribute of the first element
    pub fn attr(&self, name: &str) -> Option<String> {
        let name = self.context().options().fold_attribute_name(name);
        let arena = self.context().arena();
        let value = self
            .nodes()
            .iter()
            .find_map(|&id| arena.node(id).filter(|n| n.is_element()))
            .and_then(|n| n.attr(&name))
            .map(str::to_string);
        value
    }

    pub fn set_attr(&self, name: &str, value: &str) -> &Self {
        let name = self.context().options().fold_attribute_name(name);
        self.for_each_element(|element| element.attrs.set(&name, value));
        self
    }

    pub fn remove_attr(&self, name: &str) -> &Self {
        let name = self.context().options().fold_attribute_name(name);
        self.for_each_element(|element| {
            element.attrs.remove(&name);
        });
        self
    }

    /// Does any element carry `class`?
    pub fn has_class(&self, class: &str) -> bool {
        let arena = self.context().arena();
        let found = self.nodes().iter().any(|&id| {
            arena
                .node(id)
                .and_then(|n| n.as_element())
                .is_some_and(|e| e.classes().any(|c| c == class))
        });
        found
    }

    /// Add each whitespace-separated class that is not already present
    pub fn add_class(&self, classes: &str) -> &Self {
        self.for_each_element(|element| {
            let mut current: Vec<String> = element.classes().map(str::to_string).collect();
            let mut changed = false;
            for class in classes.split_ascii_whitespace() {
                if !current.iter().any(|c| c == class) {
                    current.push(class.to_string());
                    changed = true;
                }
            }
            if changed {
                element.attrs.set("class", &current.join(" "));
            }
        });
        self
    }

    /// Remove the given classes; the attribute is dropped once empty
    pub fn remove_class(&self, classes: &str) -> &Self {
        let removed: AHashSet<&str> = classes.split_ascii_whitespace().collect();
        self.for_each_element(|element| {
            if !element.attrs.contains("class") {
                return;
            }
            let kept: Vec<&str> = element
                .classes()
                .filter(|c| !removed.contains(c))
                .collect();
            if kept.is_empty() {
                element.attrs.remove("class");
            } else {
                let joined = kept.join(" ");
                element.attrs.set("class", &joined);
            }
        });
        self
    }

    /// Flip each class independently on every element
    pub fn toggle_class(&self, classes: &str) -> &Self {
        self.for_each_element(|element| {
            let mut current: Vec<String> = element.classes().map(str::to_string).collect();
            for class in classes.split_ascii_whitespace() {
                match current.iter().position(|c| c == class) {
                    Some(idx) => {
                        current.remove(idx);
                    }
                    None => current.push(class.to_string()),
                }
            }
            if current.is_empty() {
                element.attrs.remove("class");
            } else {
                element.attrs.set("class", &current.join(" "));
            }
        });
        self
    }
}
