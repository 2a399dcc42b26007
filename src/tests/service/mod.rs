mod tag_test;
