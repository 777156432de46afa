//! Flow catalogue
//!
//! The four upload-gated submissions share one controller. What differs
//! between them lives here: endpoint paths, required slots, and the typed
//! detail form validated before any network call.

use festreg_common::events::FlowKind;
use festreg_common::validation::{validate_not_blank, validate_phone};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors};

/// Minimum length of a chosen password
pub const MIN_PASSWORD_LEN: usize = 8;

/// File families a slot accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptedFiles {
    /// jpeg, png, webp
    Images,
    /// images, plus pdf when the upload policy allows it
    ImagesOrPdf,
}

/// One required file of a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub accepts: AcceptedFiles,
}

/// Static description of a flow
#[derive(Debug, PartialEq, Eq)]
pub struct FlowSpec {
    pub kind: FlowKind,
    pub title: &'static str,
    pub init_path: &'static str,
    pub finalize_path: &'static str,
    pub slots: &'static [SlotSpec],
}

const PASSPORT_PHOTO: SlotSpec = SlotSpec {
    name: "passport_photo",
    label: "Passport photo",
    accepts: AcceptedFiles::Images,
};

const ID_PROOF_A: SlotSpec = SlotSpec {
    name: "id_proof_a",
    label: "ID proof (front)",
    accepts: AcceptedFiles::ImagesOrPdf,
};

const ID_PROOF_B: SlotSpec = SlotSpec {
    name: "id_proof_b",
    label: "ID proof (back)",
    accepts: AcceptedFiles::ImagesOrPdf,
};

const PAYMENT_RECEIPT: SlotSpec = SlotSpec {
    name: "payment_receipt",
    label: "Payment receipt",
    accepts: AcceptedFiles::ImagesOrPdf,
};

static STUDENT_REGISTRATION: FlowSpec = FlowSpec {
    kind: FlowKind::StudentRegistration,
    title: "Student registration",
    init_path: "/api/student/register/init",
    finalize_path: "/api/student/register/finalize",
    slots: &[PASSPORT_PHOTO, ID_PROOF_A, ID_PROOF_B],
};

static ACCOMPANIST_REGISTRATION: FlowSpec = FlowSpec {
    kind: FlowKind::AccompanistRegistration,
    title: "Accompanist registration",
    init_path: "/api/accompanist/init",
    finalize_path: "/api/accompanist/finalize",
    slots: &[PASSPORT_PHOTO, ID_PROOF_A],
};

static MANAGER_PROFILE: FlowSpec = FlowSpec {
    kind: FlowKind::ManagerProfile,
    title: "Manager profile",
    init_path: "/api/manager/profile/init",
    finalize_path: "/api/manager/profile/finalize",
    slots: &[PASSPORT_PHOTO],
};

static FEE_PAYMENT: FlowSpec = FlowSpec {
    kind: FlowKind::FeePayment,
    title: "Fee payment",
    init_path: "/api/payments/init",
    finalize_path: "/api/payments/finalize",
    slots: &[PAYMENT_RECEIPT],
};

impl FlowSpec {
    pub fn for_kind(kind: FlowKind) -> &'static FlowSpec {
        match kind {
            FlowKind::StudentRegistration => &STUDENT_REGISTRATION,
            FlowKind::AccompanistRegistration => &ACCOMPANIST_REGISTRATION,
            FlowKind::ManagerProfile => &MANAGER_PROFILE,
            FlowKind::FeePayment => &FEE_PAYMENT,
        }
    }
}

/// A flow's detail form and its finalize-step fields
pub trait FlowForm:
    Serialize + DeserializeOwned + Validate + Clone + Send + Sync + 'static
{
    const KIND: FlowKind;

    /// Extra fields sent with finalize
    type Finalize: Serialize + Validate + Send + Sync;

    fn spec() -> &'static FlowSpec {
        FlowSpec::for_kind(Self::KIND)
    }
}

/// Finalize step without extra fields
#[derive(Debug, Clone, Default, Serialize)]
pub struct NoExtras {}

impl Validate for NoExtras {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

/// Password chosen at the end of student registration
#[derive(Debug, Clone, Serialize)]
pub struct StudentCredentials {
    pub password: String,
    #[serde(skip_serializing)]
    pub confirm_password: String,
}

impl StudentCredentials {
    pub fn new(password: impl Into<String>, confirm_password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            confirm_password: confirm_password.into(),
        }
    }
}

impl Validate for StudentCredentials {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut failed = false;

        if self.password.chars().count() < MIN_PASSWORD_LEN {
            let mut err = ValidationError::new("length");
            err.message = Some(Cow::Borrowed("Password must be at least 8 characters"));
            errors.add("password", err);
            failed = true;
        }
        if self.password != self.confirm_password {
            let mut err = ValidationError::new("must_match");
            err.message = Some(Cow::Borrowed("Passwords do not match"));
            errors.add("confirm_password", err);
            failed = true;
        }

        if failed {
            Err(errors)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct StudentRegistration {
    #[validate(custom(function = "validate_not_blank"))]
    pub full_name: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub college_code: String,
    /// University seat number
    #[validate(custom(function = "validate_not_blank"))]
    pub usn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

impl FlowForm for StudentRegistration {
    const KIND: FlowKind = FlowKind::StudentRegistration;
    type Finalize = StudentCredentials;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccompanistType {
    Faculty,
    Professional,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AccompanistRegistration {
    #[validate(custom(function = "validate_not_blank"))]
    pub full_name: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "Enter a valid email address"))]
    pub email: Option<String>,
    #[validate(custom(function = "validate_not_blank"))]
    pub college_code: String,
    pub accompanist_type: AccompanistType,
}

impl FlowForm for AccompanistRegistration {
    const KIND: FlowKind = FlowKind::AccompanistRegistration;
    type Finalize = NoExtras;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ManagerProfile {
    #[validate(custom(function = "validate_not_blank"))]
    pub full_name: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub designation: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub college_code: String,
}

impl FlowForm for ManagerProfile {
    const KIND: FlowKind = FlowKind::ManagerProfile;
    type Finalize = NoExtras;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FeePayment {
    #[validate(custom(function = "validate_not_blank"))]
    pub college_code: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub payer_name: String,
    /// Bank/UPI reference of the transfer
    #[validate(custom(function = "validate_not_blank"))]
    pub transaction_reference: String,
    /// Amount paid, in rupees
    #[validate(range(min = 1, message = "Amount must be at least 1"))]
    pub amount: u32,
}

impl FlowForm for FeePayment {
    const KIND: FlowKind = FlowKind::FeePayment;
    type Finalize = NoExtras;
}
