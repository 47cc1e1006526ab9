use crate::wizard::OptionItem;

/// Numeric identifier assigned by the backend.
pub type EntityId = i64;

/// Identifies entities that expose a stable unique identifier.
pub trait Identifiable {
    fn id(&self) -> EntityId;
}

/// Provides access to a human-friendly entity name.
pub trait NamedEntity {
    fn name(&self) -> &str;
}

/// Supplies a presentation-ready label for UI or logs.
pub trait Displayable {
    fn display_label(&self) -> String;
}

/// Converts any listed entity into a selectable option.
pub fn to_option<T: Identifiable + Displayable>(entity: &T) -> OptionItem {
    OptionItem::new(entity.id(), entity.display_label())
}

pub fn to_options<T: Identifiable + Displayable>(entities: &[T]) -> Vec<OptionItem> {
    entities.iter().map(to_option).collect()
}
