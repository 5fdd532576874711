
mod finalize_tests;
mod job_claim_tests;
