mod test_message_delivered;
