mod test_cross_room_signal_dropped;
mod test_offer_is_stamped_with_sender;
