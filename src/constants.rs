/// Column names of the patient encounter export.
/// These are also the field names of the stored documents.

// Fields checked by the integrity rules
pub const NAME: &str = "Name";
pub const AGE: &str = "Age";
pub const BILLING_AMOUNT: &str = "Billing Amount";
pub const DATE_OF_ADMISSION: &str = "Date of Admission";
pub const DISCHARGE_DATE: &str = "Discharge Date";

// Pass-through fields
pub const GENDER: &str = "Gender";
pub const BLOOD_TYPE: &str = "Blood Type";
pub const MEDICAL_CONDITION: &str = "Medical Condition";
pub const DOCTOR: &str = "Doctor";
pub const HOSPITAL: &str = "Hospital";
pub const INSURANCE_PROVIDER: &str = "Insurance Provider";
pub const ROOM_NUMBER: &str = "Room Number";
pub const ADMISSION_TYPE: &str = "Admission Type";
pub const MEDICATION: &str = "Medication";
pub const TEST_RESULTS: &str = "Test Results";

/// Columns parsed into calendar dates during cleaning
pub const DATE_COLUMNS: [&str; 2] = [DATE_OF_ADMISSION, DISCHARGE_DATE];

/// Fields a stored document must carry for a load to verify cleanly
pub const DEFAULT_REQUIRED_FIELDS: [&str; 6] = [
    NAME,
    AGE,
    MEDICAL_CONDITION,
    BILLING_AMOUNT,
    DATE_OF_ADMISSION,
    DISCHARGE_DATE,
];

pub const DEFAULT_DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

pub const DEFAULT_STORE_URI: &str = "memory://localhost";
pub const DEFAULT_DATABASE: &str = "healthcare";
pub const DEFAULT_COLLECTION: &str = "patients";
pub const DEFAULT_INPUT: &str = "healthcare_dataset.csv";
