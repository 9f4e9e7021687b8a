//! Field and method descriptor helpers.
//!
//! Only the pieces needed for preparation and resolution are implemented here: the result
//! type a descriptor leaves on the expression stack, the number of argument slots a method
//! consumes and whether a constant's type is a reference.

use strum::{EnumCount, EnumIter, FromRepr};

use crate::Result;

/// The kind of value an instruction leaves on the top of the expression stack.
///
/// Stored in a single byte inside resolution entries, so the discriminants are part of the
/// cache layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, FromRepr)]
#[repr(u8)]
pub enum ResultType {
    /// `B`
    Byte = 0,
    /// `Z`
    Boolean = 1,
    /// `C`
    Char = 2,
    /// `S`
    Short = 3,
    /// `I`
    Int = 4,
    /// `J`
    Long = 5,
    /// `F`
    Float = 6,
    /// `D`
    Double = 7,
    /// `L...;` and `[...`
    Object = 8,
    /// `V`
    Void = 9,
}

impl ResultType {
    /// Maps the first character of a field type onto its result type.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for characters that do not start a field type.
    pub fn from_type_char(c: u8) -> Result<Self> {
        Ok(match c {
            b'B' => ResultType::Byte,
            b'Z' => ResultType::Boolean,
            b'C' => ResultType::Char,
            b'S' => ResultType::Short,
            b'I' => ResultType::Int,
            b'J' => ResultType::Long,
            b'F' => ResultType::Float,
            b'D' => ResultType::Double,
            b'L' | b'[' => ResultType::Object,
            b'V' => ResultType::Void,
            _ => return Err(malformed_error!("Invalid type character - {}", c as char)),
        })
    }

    /// Result type of a field descriptor such as `I` or `Ljava/lang/String;`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is empty or invalid.
    pub fn of_field(descriptor: &str) -> Result<Self> {
        match descriptor.as_bytes().first() {
            Some(b'V') | None => Err(malformed_error!(
                "Invalid field descriptor - '{}'",
                descriptor
            )),
            Some(c) => Self::from_type_char(*c),
        }
    }

    /// Result type of the return value of a method descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor has no return type.
    pub fn of_method_return(descriptor: &str) -> Result<Self> {
        let Some(close) = descriptor.rfind(')') else {
            return Err(malformed_error!(
                "Invalid method descriptor - '{}'",
                descriptor
            ));
        };

        match descriptor.as_bytes().get(close + 1) {
            Some(c) => Self::from_type_char(*c),
            None => Err(malformed_error!(
                "Method descriptor without return type - '{}'",
                descriptor
            )),
        }
    }

    /// Decodes the stored byte form.
    #[must_use]
    pub fn from_byte(value: u8) -> Option<Self> {
        Self::from_repr(value)
    }

    /// Number of stack slots a value of this type occupies.
    #[must_use]
    pub fn slots(self) -> u16 {
        match self {
            ResultType::Long | ResultType::Double => 2,
            ResultType::Void => 0,
            _ => 1,
        }
    }
}

/// Returns true if a field descriptor names a reference type (object or array).
#[must_use]
pub fn is_reference_descriptor(descriptor: &str) -> bool {
    matches!(descriptor.as_bytes().first(), Some(b'L' | b'['))
}

/// Computes the number of argument slots a method descriptor consumes.
///
/// `long` and `double` arguments take two slots. When `has_receiver` is set, one more slot is
/// counted for the receiver.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the parameter list cannot be parsed.
pub fn parameter_slots(descriptor: &str, has_receiver: bool) -> Result<u16> {
    let bytes = descriptor.as_bytes();
    if bytes.first() != Some(&b'(') {
        return Err(malformed_error!(
            "Method descriptor must start with '(' - '{}'",
            descriptor
        ));
    }

    let mut slots: u16 = u16::from(has_receiver);
    let mut pos = 1;
    loop {
        let Some(&c) = bytes.get(pos) else {
            return Err(malformed_error!(
                "Unterminated parameter list - '{}'",
                descriptor
            ));
        };

        if c == b')' {
            return Ok(slots);
        }

        let mut array = false;
        while bytes.get(pos) == Some(&b'[') {
            array = true;
            pos += 1;
        }

        match bytes.get(pos) {
            Some(b'L') => match descriptor[pos..].find(';') {
                Some(end) => pos += end + 1,
                None => {
                    return Err(malformed_error!(
                        "Unterminated class name - '{}'",
                        descriptor
                    ))
                }
            },
            Some(c) => {
                let kind = ResultType::from_type_char(*c)?;
                if kind == ResultType::Void {
                    return Err(malformed_error!(
                        "Void parameter in descriptor - '{}'",
                        descriptor
                    ));
                }
                if !array {
                    slots = slots.saturating_add(kind.slots() - 1);
                }
                pos += 1;
            }
            None => {
                return Err(malformed_error!(
                    "Unterminated parameter list - '{}'",
                    descriptor
                ))
            }
        }

        slots = slots.saturating_add(1);
    }
}
