//! Analysis prompts, one per job type.

use opal_core::JobType;

pub const SYSTEM_PROMPT: &str = "You are an expert investment document analyst. \
Extract structured information accurately. When you report structured data, \
put it in a fenced ```json block with a short \"summary\" field and a \
\"confidence\" value between 0 and 1.";

const DOCUMENT_ANALYSIS: &str = "Analyze this investment document thoroughly. Extract:
1. Document type and purpose
2. Key dates (signing, expiration, etc.)
3. Financial amounts mentioned (purchase price, fees, taxes)
4. Parties involved (buyers, sellers, witnesses)
5. Property/Investment details (location, size, description)
6. Important clauses or conditions
7. Risk factors or red flags

Provide your analysis in a structured format.";

const VALUATION: &str = "Analyze this document for valuation. Extract:
1. Exact location (address, city, state, coordinates if available)
2. Area or size (in m², hectares, or other units)
3. Zoning or usage classification
4. Purchase/sale price and currency
5. Ownership details
6. Any restrictions, liens, or encumbrances
7. Comparable values or appraisals referenced
8. Access to infrastructure (roads, water, electricity)

Provide specific measurements and values with confidence scores.";

const OCR: &str = "Perform OCR on this image/document and extract all visible text.
Maintain the original structure and formatting as much as possible.
Identify sections, headers, and key-value pairs.";

const SUMMARIZATION: &str = "Summarize this investment document in 500 characters \
or less. Focus on key financial terms, parties, and important details.";

pub fn analysis_prompt(job_type: JobType) -> &'static str {
    match job_type {
        JobType::DocumentAnalysis | JobType::Custom => DOCUMENT_ANALYSIS,
        JobType::Valuation => VALUATION,
        JobType::Ocr => OCR,
        JobType::Summarization => SUMMARIZATION,
    }
}
