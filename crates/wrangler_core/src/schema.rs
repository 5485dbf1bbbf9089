//! Model schemas.
//!
//! A [`Schema`] lists the attributes of one model kind in declaration order.
//! It can be edited freely until it is bound to a factory, after which it is
//! shared immutably by every instance of that kind.

use crate::error::{CoreError, CoreResult};
use crate::value::{Props, Value};

/// Names that collide with instance members and cannot be used as
/// attribute or property names.
pub const RESERVED_NAMES: &[&str] = &[
    "id", "save", "remove", "set", "get", "schema", "factory", "changes", "on", "emit",
];

/// Prefix marking a private, never-persisted property.
pub const PRIVATE_PREFIX: char = '_';

/// Returns true if `name` is a reserved member name.
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Returns true if `name` denotes a private property.
#[must_use]
pub fn is_private(name: &str) -> bool {
    name.starts_with(PRIVATE_PREFIX)
}

/// Declaration of one attribute.
///
/// ```rust
/// use wrangler_core::{Attribute, Value};
///
/// let username = Attribute::new("username").indexed().required();
/// let role = Attribute::new("role").default(Value::from("member"));
/// assert!(username.is_indexed());
/// assert_eq!(role.default_value(), &Value::from("member"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    name: String,
    default: Value,
    indexed: bool,
    required: bool,
    silent: bool,
}

impl Attribute {
    /// Declares an attribute with a `Null` default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: Value::Null,
            indexed: false,
            required: false,
            silent: false,
        }
    }

    /// Maintains a unique secondary index on this attribute.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Rejects saves while the attribute is `Null`.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Emits no change events and is never persisted.
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Sets the value applied when `create` omits the attribute.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default value.
    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// Whether the attribute is indexed.
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Whether the attribute is required.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether the attribute is silent.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Whether the attribute is written to the store.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        !self.silent
    }
}

/// Ordered set of attribute declarations for one model kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    attributes: Vec<Attribute>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute, consuming and returning the schema.
    ///
    /// # Errors
    ///
    /// See [`Schema::add`].
    pub fn with(mut self, attribute: Attribute) -> CoreResult<Self> {
        self.add(attribute)?;
        Ok(self)
    }

    /// Adds an attribute.
    ///
    /// # Errors
    ///
    /// Returns `AttributeExists` if the name is already declared,
    /// `ReservedKeyConflict` for reserved names and `InvalidName` for empty
    /// or private names.
    pub fn add(&mut self, attribute: Attribute) -> CoreResult<&mut Self> {
        validate_attribute_name(attribute.name())?;
        if self.contains(attribute.name()) {
            return Err(CoreError::AttributeExists {
                name: attribute.name,
            });
        }
        self.attributes.push(attribute);
        Ok(self)
    }

    /// Adds an attribute, replacing an existing declaration in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is reserved, empty or private.
    pub fn add_forced(&mut self, attribute: Attribute) -> CoreResult<&mut Self> {
        validate_attribute_name(attribute.name())?;
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name == attribute.name)
        {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
        Ok(self)
    }

    /// Removes an attribute and returns its declaration.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAttribute` if the name is not declared.
    pub fn remove(&mut self, name: &str) -> CoreResult<Attribute> {
        let pos = self
            .attributes
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(|| CoreError::unknown_attribute(name))?;
        Ok(self.attributes.remove(pos))
    }

    /// Returns the declaration of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Returns true if `name` is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over declarations in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    /// Iterates over indexed declarations.
    pub fn indexed(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|a| a.indexed)
    }

    /// Returns the number of declared attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns true if no attribute is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Returns every attribute set to its default.
    #[must_use]
    pub fn defaults(&self) -> Props {
        self.attributes
            .iter()
            .map(|a| (a.name.clone(), a.default.clone()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.iter()
    }
}

fn validate_attribute_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_name(name, "attribute names cannot be empty"));
    }
    if is_private(name) {
        return Err(CoreError::invalid_name(
            name,
            "attribute names cannot start with '_'",
        ));
    }
    if is_reserved(name) {
        return Err(CoreError::ReservedKeyConflict {
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_schema() -> Schema {
        Schema::new()
            .with(Attribute::new("username").indexed().required())
            .unwrap()
            .with(Attribute::new("email").indexed())
            .unwrap()
            .with(Attribute::new("role").default("member"))
            .unwrap()
            .with(Attribute::new("session").silent())
            .unwrap()
    }

    #[test]
    fn keeps_declaration_order() {
        let names: Vec<_> = user_schema().iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, ["username", "email", "role", "session"]);
    }

    #[test]
    fn indexed_filter() {
        let schema = user_schema();
        let indexed: Vec<_> = schema.indexed().map(Attribute::name).collect();
        assert_eq!(indexed, ["username", "email"]);
    }

    #[test]
    fn duplicate_add_fails_unless_forced() {
        let mut schema = user_schema();
        assert!(matches!(
            schema.add(Attribute::new("role")),
            Err(CoreError::AttributeExists { .. })
        ));

        schema.add_forced(Attribute::new("role").default("admin")).unwrap();
        assert_eq!(schema.len(), 4);
        assert_eq!(schema.get("role").unwrap().default_value(), &Value::from("admin"));
    }

    #[test]
    fn remove_unknown_fails() {
        let mut schema = user_schema();
        assert!(schema.remove("role").is_ok());
        assert!(matches!(
            schema.remove("role"),
            Err(CoreError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn reserved_and_private_names_rejected() {
        let mut schema = Schema::new();
        assert!(matches!(
            schema.add(Attribute::new("save")),
            Err(CoreError::ReservedKeyConflict { .. })
        ));
        assert!(matches!(
            schema.add(Attribute::new("_secret")),
            Err(CoreError::InvalidName { .. })
        ));
        assert!(schema.add(Attribute::new("")).is_err());
    }

    #[test]
    fn defaults_cover_every_attribute() {
        let defaults = user_schema().defaults();
        assert_eq!(defaults.len(), 4);
        assert_eq!(defaults["role"], Value::from("member"));
        assert!(defaults["username"].is_null());
    }
}
