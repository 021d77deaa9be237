use anyhow::{Context, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// An untyped (JSON) Object from which [TypedParameters](TypedParameter) can be parsed.
///
/// Can represent authorization request objects or form-encoded token responses.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UntypedObject(pub(crate) Map<String, Json>);

/// A strongly typed parameter that can represent request or response parameters.
pub trait TypedParameter:
    TryFrom<Json, Error = anyhow::Error> + TryInto<Json> + Clone + std::fmt::Debug
{
    const KEY: &'static str;
}

impl UntypedObject {
    /// Get a [TypedParameter] from the Object or return the default value.
    ///
    /// Note that this method clones the underlying data.
    pub fn get_or_default<T: TypedParameter + Default>(&self) -> Result<T> {
        Ok(self
            .0
            .get(T::KEY)
            .cloned()
            .map(TryInto::try_into)
            .transpose()?
            .unwrap_or_default())
    }

    /// Get a [TypedParameter] from the Object.
    ///
    /// Note that this method clones the underlying data.
    pub fn get<T: TypedParameter>(&self) -> Option<Result<T>> {
        Some(self.0.get(T::KEY)?.clone().try_into().map_err(Into::into))
    }

    /// Remove a [TypedParameter] from the Object.
    pub fn remove<T: TypedParameter>(&mut self) -> Option<Result<T>> {
        Some(self.0.remove(T::KEY)?.try_into().map_err(Into::into))
    }

    /// Insert a [TypedParameter].
    ///
    /// Returns the existing [TypedParameter] if one already exists.
    ///
    /// # Errors
    /// Returns an error if there was already an entry in the Object, but it could not be parsed from JSON.
    pub fn insert<T: TypedParameter>(&mut self, t: T) -> Option<Result<T>> {
        match t.try_into() {
            Err(_) => Some(Err(Error::msg("failed to parse typed parameter"))),
            Ok(value) => Some(
                self.0
                    .insert(T::KEY.to_owned(), value)?
                    .try_into()
                    .map_err(Into::into),
            ),
        }
    }

    /// Whether the Object holds a value for the given [TypedParameter].
    pub fn contains<T: TypedParameter>(&self) -> bool {
        self.0.contains_key(T::KEY)
    }

    /// Encode the Object as `application/x-www-form-urlencoded` parameters.
    ///
    /// String values are written verbatim, every other value is written as compact JSON.
    pub fn to_http_query_string(&self) -> Result<String> {
        let pairs = self
            .0
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Json::String(s) => s.clone(),
                    other => serde_json::to_string(other)
                        .with_context(|| format!("'{key}' could not be encoded"))?,
                };
                Ok((key.as_str(), value))
            })
            .collect::<Result<Vec<_>>>()?;

        serde_urlencoded::to_string(pairs).context("failed to encode query parameters")
    }

    /// Build the Object from decoded HTTP parameters.
    ///
    /// Values holding a JSON object or array are parsed as such, everything else is kept as a
    /// string (e.g. a compact JWT).
    pub fn from_http_parameters<K, V>(parameters: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: AsRef<str>,
    {
        let map = parameters
            .into_iter()
            .map(|(key, value)| {
                let value = value.as_ref();
                let parsed = match serde_json::from_str::<Json>(value) {
                    Ok(json @ (Json::Object(_) | Json::Array(_))) => json,
                    _ => Json::String(value.to_owned()),
                };
                (key.into(), parsed)
            })
            .collect();
        Self(map)
    }

    /// Parse an `application/x-www-form-urlencoded` body.
    pub fn from_x_www_form_urlencoded(body: &[u8]) -> Result<Self> {
        let parameters: Vec<(String, String)> =
            serde_urlencoded::from_bytes(body).context("failed to decode form parameters")?;
        Ok(Self::from_http_parameters(parameters))
    }
}

impl From<UntypedObject> for Json {
    fn from(value: UntypedObject) -> Self {
        value.0.into()
    }
}

impl From<Map<String, Json>> for UntypedObject {
    fn from(value: Map<String, Json>) -> Self {
        Self(value)
    }
}

pub trait ParsingErrorContext {
    type T: TypedParameter;

    fn parsing_error(self) -> Result<Self::T>;
}

impl<T: TypedParameter> ParsingErrorContext for Option<Result<T>> {
    type T = T;

    fn parsing_error(self) -> Result<T> {
        self.context(format!("'{}' is missing", T::KEY))?
            .context(format!("'{}' could not be parsed", T::KEY))
    }
}

impl<T: TypedParameter> ParsingErrorContext for Result<T> {
    type T = T;

    fn parsing_error(self) -> Result<T> {
        self.context(format!("'{}' could not be parsed", T::KEY))
    }
}
