mod test_pir;
