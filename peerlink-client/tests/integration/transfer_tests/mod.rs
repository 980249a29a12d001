mod test_file_transfer_completes;
mod test_file_transfer_rejected;
