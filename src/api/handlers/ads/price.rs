//! Listing price with its `"<integer> $"` wire format.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::{fmt, str::FromStr};
use utoipa::{
    PartialSchema, ToSchema,
    openapi::{ObjectBuilder, RefOr, Schema, Type},
};

/// Message carried by every price decoding failure; the JSON rejection mapping
/// looks for it to report `InvalidPriceFormat`.
pub const PRICE_FORMAT_ERROR: &str = "invalid price format";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid price format")]
pub struct PriceError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Price(pub i32);

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} $", self.0)
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split(' ').collect::<Vec<_>>().as_slice() {
            [amount, "$"] if is_integer_literal(amount) => {
                amount.parse::<i32>().map(Self).map_err(|_| PriceError)
            }
            _ => Err(PriceError),
        }
    }
}

/// ASCII digits with an optional leading `-`; negatives are left to validation.
fn is_integer_literal(amount: &str) -> bool {
    let digits = amount.strip_prefix('-').unwrap_or(amount);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PriceVisitor;

        impl<'de> de::Visitor<'de> for PriceVisitor {
            type Value = Price;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a price string such as \"150 $\"")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Price, E> {
                value.parse().map_err(|_| E::custom(PRICE_FORMAT_ERROR))
            }

            fn visit_i64<E: de::Error>(self, _: i64) -> Result<Price, E> {
                Err(E::custom(PRICE_FORMAT_ERROR))
            }

            fn visit_u64<E: de::Error>(self, _: u64) -> Result<Price, E> {
                Err(E::custom(PRICE_FORMAT_ERROR))
            }

            fn visit_f64<E: de::Error>(self, _: f64) -> Result<Price, E> {
                Err(E::custom(PRICE_FORMAT_ERROR))
            }

            fn visit_bool<E: de::Error>(self, _: bool) -> Result<Price, E> {
                Err(E::custom(PRICE_FORMAT_ERROR))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Price, E> {
                Err(E::custom(PRICE_FORMAT_ERROR))
            }

            fn visit_none<E: de::Error>(self) -> Result<Price, E> {
                Err(E::custom(PRICE_FORMAT_ERROR))
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, _: A) -> Result<Price, A::Error> {
                Err(de::Error::custom(PRICE_FORMAT_ERROR))
            }

            fn visit_map<A: de::MapAccess<'de>>(self, _: A) -> Result<Price, A::Error> {
                Err(de::Error::custom(PRICE_FORMAT_ERROR))
            }
        }

        deserializer.deserialize_any(PriceVisitor)
    }
}

impl PartialSchema for Price {
    fn schema() -> RefOr<Schema> {
        ObjectBuilder::new()
            .schema_type(Type::String)
            .examples([serde_json::json!("150 $")])
            .into()
    }
}

impl ToSchema for Price {}
