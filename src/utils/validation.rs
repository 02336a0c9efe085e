//! Validation utilities

use bigdecimal::BigDecimal;

use crate::document::Document;
use crate::traits::*;
use crate::types::*;

const GSTIN_ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Validate that an amount is positive
pub fn validate_positive_amount(field: &str, amount: &BigDecimal) -> EngineResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(EngineError::validation(
            field,
            format!("must be positive, got {}", amount),
        ))
    } else {
        Ok(())
    }
}

/// Validate that an amount is zero or positive
pub fn validate_non_negative_amount(field: &str, amount: &BigDecimal) -> EngineResult<()> {
    if *amount < BigDecimal::from(0) {
        Err(EngineError::validation(
            field,
            format!("must not be negative, got {}", amount),
        ))
    } else {
        Ok(())
    }
}

/// Validate a percentage lies in 0..=100
pub fn validate_percentage(field: &str, value: &BigDecimal) -> EngineResult<()> {
    if *value < BigDecimal::from(0) || *value > BigDecimal::from(100) {
        return Err(EngineError::validation(
            field,
            format!("must be between 0 and 100, got {}", value),
        ));
    }
    Ok(())
}

/// Validate a GST state code: two digits naming a state, union territory,
/// or one of the special jurisdictions (96 foreign, 97 other territory,
/// 99 centre)
pub fn validate_state_code(code: &str) -> EngineResult<()> {
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(EngineError::validation(
            "state_code",
            format!("'{}' is not a two-digit GST state code", code),
        ));
    }

    let numeric: u32 = code
        .parse()
        .map_err(|_| EngineError::validation("state_code", format!("'{}' is not numeric", code)))?;

    match numeric {
        1..=38 | 96 | 97 | 99 => Ok(()),
        _ => Err(EngineError::validation(
            "state_code",
            format!("'{}' is not an assigned GST state code", code),
        )),
    }
}

/// Validate the structure and check character of a GSTIN
pub fn validate_gstin(gstin: &str) -> EngineResult<()> {
    let chars: Vec<char> = gstin.chars().collect();
    if chars.len() != 15 {
        return Err(EngineError::validation(
            "gstin",
            format!("'{}' must be 15 characters", gstin),
        ));
    }

    let well_formed = chars[0..2].iter().all(|c| c.is_ascii_digit())
        && chars[2..7].iter().all(|c| c.is_ascii_uppercase())
        && chars[7..11].iter().all(|c| c.is_ascii_digit())
        && chars[11].is_ascii_uppercase()
        && (chars[12].is_ascii_uppercase() || ('1'..='9').contains(&chars[12]))
        && chars[13] == 'Z'
        && (chars[14].is_ascii_uppercase() || chars[14].is_ascii_digit());

    if !well_formed {
        return Err(EngineError::validation(
            "gstin",
            format!("'{}' is not a well-formed GSTIN", gstin),
        ));
    }

    validate_state_code(&gstin[0..2])?;

    let expected = gstin_check_char(&gstin[0..14])?;
    if chars[14] != expected {
        return Err(EngineError::validation(
            "gstin",
            format!("'{}' has an invalid check character", gstin),
        ));
    }

    Ok(())
}

/// Compute the mod-36 check character over the first 14 GSTIN characters
pub fn gstin_check_char(body: &str) -> EngineResult<char> {
    let mut sum = 0u32;
    for (index, c) in body.chars().enumerate() {
        let value = GSTIN_ALPHABET
            .find(c)
            .ok_or_else(|| EngineError::validation("gstin", format!("invalid character '{}'", c)))?
            as u32;
        let factor = if index % 2 == 0 { 1 } else { 2 };
        let product = value * factor;
        sum += product / 36 + product % 36;
    }
    let check = ((36 - sum % 36) % 36) as usize;
    GSTIN_ALPHABET
        .chars()
        .nth(check)
        .ok_or_else(|| EngineError::validation("gstin", "check character out of range"))
}

/// Extract the state code from a GSTIN
pub fn state_code_from_gstin(gstin: &str) -> EngineResult<String> {
    let prefix = gstin
        .get(0..2)
        .ok_or_else(|| EngineError::validation("gstin", "too short to carry a state code"))?;
    validate_state_code(prefix)?;
    Ok(prefix.to_string())
}

/// Validate that an identifier is usable as a party or document id
pub fn validate_identifier(field: &str, id: &str) -> EngineResult<()> {
    if id.trim().is_empty() {
        return Err(EngineError::validation(field, "cannot be empty"));
    }

    if id.len() > 64 {
        return Err(EngineError::validation(
            field,
            "cannot exceed 64 characters",
        ));
    }

    // Document numbers commonly use slashes (e.g. INV/2024-25/001)
    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '/')
    {
        return Err(EngineError::validation(
            field,
            "can only contain alphanumeric characters, dashes, underscores, and slashes",
        ));
    }

    Ok(())
}

/// Validate that a party name is valid
pub fn validate_party_name(name: &str) -> EngineResult<()> {
    if name.trim().is_empty() {
        return Err(EngineError::validation("party.name", "cannot be empty"));
    }

    if name.len() > 100 {
        return Err(EngineError::validation(
            "party.name",
            "cannot exceed 100 characters",
        ));
    }

    Ok(())
}

/// Enhanced party validator with detailed checks
pub struct EnhancedPartyValidator;

impl PartyValidator for EnhancedPartyValidator {
    fn validate_party(&self, party: &Party) -> EngineResult<()> {
        party.validate()?;
        validate_identifier("party.id", &party.id)?;
        validate_party_name(&party.name)?;
        Ok(())
    }
}

/// Enhanced document validator with detailed checks
pub struct EnhancedDocumentValidator;

impl DocumentValidator for EnhancedDocumentValidator {
    fn validate_document(&self, document: &Document) -> EngineResult<()> {
        document.validate()?;
        validate_identifier("document.id", &document.id)?;

        if let Some(reference) = &document.reference {
            if reference.len() > 200 {
                return Err(EngineError::validation(
                    "document.reference",
                    "cannot exceed 200 characters",
                ));
            }
        }

        Ok(())
    }
}
